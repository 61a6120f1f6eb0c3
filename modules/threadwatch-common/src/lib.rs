pub mod config;
pub mod error;
pub mod gate;
pub mod tabular;
pub mod types;

pub use config::{BrowserSettings, Credentials, HarvestConfig, LoginWait, SurveyConfig};
pub use error::{ExtractionFailure, HarvestError};
pub use gate::{await_login_wall, GateTrigger, SessionGate};
pub use tabular::{CsvTableWriter, ParquetTableWriter, Table, TableWriter, TabularRecord};
pub use types::*;
