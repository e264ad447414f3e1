pub mod db;
pub mod file_storage;
pub mod mangadex;

pub use db::DbAdapter;
pub use file_storage::FileStorage;
pub use mangadex::MangaDexCatalog;
