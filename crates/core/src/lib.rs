pub mod config;

pub use config::{load_dotenv, AwsConfig, Config, QueryConfig};
