pub mod app_config;
pub mod categories;
pub mod config;
pub mod detect;
pub mod identity;
pub mod model;
pub mod price;
pub mod retry;
pub mod shape;
pub mod store;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, NotifyMode};
pub use categories::{load_categories, CategoriesFile, CategoryConfig};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use detect::{
    detect_changes, percent_drop, CategoryDelta, DeltaCounts, ObservedProduct, PriceMovement,
};
pub use identity::{resolve_product_key, IdentityError};
pub use model::{
    Category, ChangeEvent, ChangeKind, PreviousProduct, PriceSample, ProductKey,
    ProductSnapshot, ProductStatus, RawItem, ResolvedItem, RunSummary,
};
pub use price::{normalize_price, PriceBounds, PriceError, PriceInput};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use shape::PageShape;
pub use store::{ApplyOutcome, CatalogStore, RunId, StoreError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read categories file {path}: {source}")]
    CategoriesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse categories file: {0}")]
    CategoriesFileParse(#[from] serde_yaml::Error),

    #[error("categories validation failed: {0}")]
    Validation(String),
}
