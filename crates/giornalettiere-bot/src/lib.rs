//! Giornalettiere bot: publishes settled downloads to a Telegram channel and
//! requests the daily papers from a download service.

pub mod channel;
pub mod download;
pub mod fetch;
pub mod gateway;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod supervisor;

pub use channel::{ChannelUpdater, PassReport};
pub use download::DownloadRequester;
pub use fetch::FetchCycle;
pub use gateway::{GatewayError, MessagingGateway, TelegramGateway, LARGE_UPLOAD_THRESHOLD};
pub use settings::{Settings, WatcherSettings, DEFAULT_SETTINGS_PATH};
pub use store::{FileListStore, JsonFileList, SqliteFileList};
pub use supervisor::WatcherSupervisor;
