//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_backup_cipher;
mod filesystem_backup_catalog;
mod filesystem_document_store;
mod pg_dump_tool;
mod postgres_case_repository;

pub use aes_backup_cipher::AesBackupCipher;
pub use filesystem_backup_catalog::FilesystemBackupCatalog;
pub use filesystem_document_store::FilesystemDocumentStore;
pub use pg_dump_tool::{DatabaseSettings, PgDumpTool};
pub use postgres_case_repository::PostgresCaseRepository;
