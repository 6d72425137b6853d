//! Mixology - state machines for cocktail discovery
//!
//! Every screen of the app is a [`machine::StateMachine`]: actions go in,
//! a processor turns them into mutations and side effects, a pure reducer
//! folds mutations into state. Repositories, stores and the router are
//! injected collaborators.

pub mod async_result;
pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod flow;
pub mod job;
pub mod logging;
pub mod machine;
pub mod navigation;
pub mod notification;
pub mod repository;
pub mod shake;
pub mod types;

// Re-export commonly used types
pub use async_result::{Async, Failure};
pub use cache::ReactiveCache;
pub use config::Config;
pub use error::{MixologyError, RepositoryError, Result};
pub use machine::{Context, Feature, Processor, StateMachine};
pub use navigation::{Destination, Router};
pub use repository::{DrinkRepository, FavoriteStore, FavoritesRepository};
pub use types::{Aggregation, Category, Drink, DrinkDetails, Facet, GeneratedDrink, SelectedFilter};
