//! mix - Drive the Mixology screens from the command line
//!
//! Each subcommand starts the matching state machine against the in-memory
//! catalog and a SQLite favorites store, waits for it to settle and prints
//! the resulting state.

use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use libmixology::config::resolve_favorites_path;
use libmixology::features::bartender::{Bartender, BartenderAction};
use libmixology::features::discovery::Discovery;
use libmixology::features::drink_detail::{DrinkDetail, DrinkDetailAction, DrinkDetailSideEffect};
use libmixology::features::drink_list::{DrinkList, DrinkListSource};
use libmixology::features::favorites::Favorites;
use libmixology::features::search::{Search, SearchAction};
use libmixology::logging::LoggingConfig;
use libmixology::notification::{NotificationAction, NotificationHandler, RoutingNotificationHandler};
use libmixology::repository::memory::{Catalog, InMemoryDrinkRepository};
use libmixology::repository::sqlite::SqliteFavoriteStore;
use libmixology::{
    Config, Destination, Drink, Failure, Feature, FavoritesRepository, MixologyError,
    ReactiveCache, RepositoryError, Router, SelectedFilter, StateMachine,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Longest we wait for a machine to settle
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "mix")]
#[command(version)]
#[command(about = "Discover cocktails from the command line")]
#[command(long_about = "\
mix - Discover cocktails from the command line

DESCRIPTION:
    mix runs the Mixology screens headless. Every command starts the same
    state machine the app uses, waits until it has loaded and prints the result.

COMMANDS:
    discover    Random drinks and categories
    search      Search drinks by name and facets
    detail      Show one drink
    list        Drinks of a collection or tag
    favorite    Toggle a drink in favorites
    favorites   List favorite drinks
    bartender   Generate a drink from a prompt
    open        Resolve a notification payload to a destination

USAGE EXAMPLES:
    # Search gin drinks containing \"ne\"
    mix search ne --filter withType=gin

    # Toggle a favorite, then list favorites as JSON
    mix favorite negroni
    mix favorites --format json

    # Route a notification
    mix open '{\"action\":\"open_drink\",\"alias\":\"negroni\"}'

CONFIGURATION:
    Configuration file: ~/.config/mixology/config.toml
    Favorites database: ~/.local/share/mixology/favorites.db

    Override with environment variables:
        MIXOLOGY_CONFIG    - Path to config file
        MIXOLOGY_CATALOG   - Path to a JSON catalog
        MIXOLOGY_LOG_LEVEL - Log filter directives (default: warn,libmixology=info)
        MIXOLOGY_LOG_FORMAT - text, json or pretty

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Drink or collection not found
    3 - Invalid input (bad filter, short prompt, bad payload)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON catalog to serve instead of the built-in one
    #[arg(long, global = true, env = "MIXOLOGY_CATALOG")]
    catalog: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show random drinks and categories
    Discover,

    /// Search drinks
    Search {
        /// Name fragment to search for
        #[arg(default_value = "")]
        query: String,

        /// Facet filter as GROUP=VALUE, e.g. withType=gin (repeatable)
        #[arg(long = "filter", value_name = "GROUP=VALUE")]
        filters: Vec<String>,
    },

    /// Show one drink
    Detail {
        /// Drink alias, e.g. negroni
        alias: String,
    },

    /// List the drinks of a collection or tag
    List {
        /// Collection name
        #[arg(long, conflicts_with = "tag", required_unless_present = "tag")]
        collection: Option<String>,

        /// Facet tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Toggle a drink in favorites
    Favorite {
        /// Drink alias
        alias: String,
    },

    /// List favorite drinks
    Favorites,

    /// Generate a drink from a free-text prompt
    Bartender {
        prompt: String,
    },

    /// Resolve a notification payload to the destination it opens
    Open {
        /// JSON payload, e.g. {"action":"open_favorites"}
        payload: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e.downcast_ref::<MixologyError>().map_or(1, |e| e.exit_code());
        std::process::exit(code);
    }
}

/// Collaborators shared by all commands
struct App {
    config: Config,
    drinks: Arc<InMemoryDrinkRepository>,
    format: OutputFormat,
}

impl App {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let config = Config::load()?;
        let catalog = match &cli.catalog {
            Some(path) => Catalog::load_from_path(path)?,
            None => Catalog::sample(),
        };
        tracing::debug!(drinks = catalog.drinks.len(), "Catalog loaded");

        Ok(Self {
            config,
            drinks: Arc::new(InMemoryDrinkRepository::new(catalog)),
            format: cli.format,
        })
    }

    async fn favorites(&self) -> anyhow::Result<FavoritesRepository> {
        let path = resolve_favorites_path(&self.config.favorites);
        let store = SqliteFavoriteStore::new(&path.to_string_lossy()).await?;
        Ok(FavoritesRepository::new(
            Arc::new(store),
            self.drinks.clone(),
            Arc::new(ReactiveCache::new()),
        ))
    }

    fn print<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> anyhow::Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => println!("{}", text()),
        }
        Ok(())
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::new(&cli)?;
    let engine = app.config.engine.clone();

    match cli.command {
        Commands::Discover => {
            let machine = Discovery::new(app.drinks.clone(), &engine).start(&engine);
            let state = settle(&machine, |s| {
                s.random_drinks.is_complete() && s.categories.is_complete()
            })
            .await?;
            let drinks = into_value(state.random_drinks)?;
            let categories = into_value(state.categories)?;

            #[derive(Serialize)]
            struct Discovered<'a> {
                random_drinks: &'a [Drink],
                categories: &'a [libmixology::Category],
            }
            app.print(
                &Discovered {
                    random_drinks: &drinks,
                    categories: &categories,
                },
                || {
                    let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
                    format!("{}\nCategories: {}", drink_lines(&drinks), names.join(", "))
                },
            )
        }

        Commands::Search { query, filters } => {
            let machine = Search::new(app.drinks.clone(), &engine).start(&engine);
            let state = settle(&machine, |s| s.aggregation.is_complete()).await?;
            let aggregation = into_value(state.aggregation)?;

            for raw in &filters {
                machine.process(SearchAction::ToggleFilter(parse_filter(raw, &aggregation)?));
            }
            machine.process(SearchAction::QueryChanged(query));
            machine.process(SearchAction::ApplyFilters);

            let state = settle(&machine, |s| s.results.is_complete()).await?;
            let drinks = into_value(state.results)?;
            app.print(&drinks, || drink_lines(&drinks))
        }

        Commands::Detail { alias } => {
            let favorites = app.favorites().await?;
            let machine = DrinkDetail::new(&alias, app.drinks.clone(), favorites).start(&engine);
            let state = settle(&machine, |s| s.details.is_complete()).await?;
            let details = into_value(state.details)?;

            app.print(&details, || {
                let mut lines = vec![heading(&details.drink)];
                if let Some(glass) = &details.glass {
                    lines.push(format!("Glass: {}", glass));
                }
                lines.extend(details.ingredients.iter().map(|i| format!("- {}", i)));
                lines.extend(
                    details
                        .steps
                        .iter()
                        .enumerate()
                        .map(|(n, step)| format!("{}. {}", n + 1, step)),
                );
                lines.join("\n")
            })
        }

        Commands::List { collection, tag } => {
            let source = match (collection, tag) {
                (Some(name), _) => DrinkListSource::Collection(name),
                (None, Some(tag)) => DrinkListSource::Tag(tag),
                (None, None) => {
                    return Err(MixologyError::InvalidInput("--collection or --tag is required".to_string()).into())
                }
            };
            let favorites = app.favorites().await?;
            let machine = DrinkList::new(source, app.drinks.clone(), favorites).start(&engine);
            let state = settle(&machine, |s| s.drinks.is_complete()).await?;
            let drinks = into_value(state.drinks)?;
            app.print(&drinks, || drink_lines(&drinks))
        }

        Commands::Favorite { alias } => {
            let favorites = app.favorites().await?;
            let machine = DrinkDetail::new(&alias, app.drinks.clone(), favorites).start(&engine);
            let state = settle(&machine, |s| s.details.is_complete()).await?;
            let before = into_value(state.details)?.drink.is_favorite;

            let mut effects = machine.side_effect_stream();
            machine.process(DrinkDetailAction::ToggleFavorite);

            let toggled = async {
                settle(&machine, |s| {
                    s.details.invoke().is_some_and(|d| d.drink.is_favorite != before)
                })
                .await
            };
            let failed = async {
                while let Some(effect) = effects.next().await {
                    if let DrinkDetailSideEffect::ShowMessage(message) = effect {
                        return anyhow!(message);
                    }
                }
                anyhow!("{} stopped before the favorite was saved", DrinkDetail::NAME)
            };
            let state = tokio::select! {
                state = toggled => state?,
                error = failed => return Err(error),
            };

            let drink = into_value(state.details)?.drink;
            app.print(&drink, || {
                let verb = if drink.is_favorite { "Added to" } else { "Removed from" };
                format!("{} favorites: {}", verb, drink.name)
            })
        }

        Commands::Favorites => {
            let favorites = app.favorites().await?;
            let machine = Favorites::new(favorites).start(&engine);
            let state = settle(&machine, |s| s.drinks.is_complete()).await?;
            let drinks = into_value(state.drinks)?;
            app.print(&drinks, || {
                if drinks.is_empty() {
                    "No favorites yet".to_string()
                } else {
                    drink_lines(&drinks)
                }
            })
        }

        Commands::Bartender { prompt } => {
            let machine = Bartender::new(app.drinks.clone(), &app.config.bartender).start(&engine);
            machine.process(BartenderAction::PromptChanged(prompt));
            machine.process(BartenderAction::Generate);

            let state = settle(&machine, |s| s.generated.is_some() || s.error.is_some()).await?;
            if let Some(error) = state.error {
                return Err(if state.is_valid {
                    anyhow!(error)
                } else {
                    MixologyError::InvalidInput(error).into()
                });
            }
            let drink = state
                .generated
                .ok_or_else(|| anyhow!("bartender finished without a drink"))?;

            app.print(&drink, || {
                let mut lines = vec![format!("{} ({})", drink.name, drink.alias), drink.description.clone()];
                lines.extend(drink.ingredients.iter().map(|i| format!("- {}", i)));
                lines.join("\n")
            })
        }

        Commands::Open { payload } => {
            let action = NotificationAction::from_payload(&payload)?;
            let router = Arc::new(PrintingRouter { format: app.format });
            RoutingNotificationHandler::new(router).handle(action);
            Ok(())
        }
    }
}

/// Wait for `predicate`, bounded by [`SETTLE_TIMEOUT`]
async fn settle<F, P>(machine: &StateMachine<F>, predicate: P) -> anyhow::Result<F::State>
where
    F: Feature,
    P: FnMut(&F::State) -> bool,
{
    tokio::time::timeout(SETTLE_TIMEOUT, machine.await_state(predicate))
        .await
        .with_context(|| format!("{} did not settle", F::NAME))?
        .ok_or_else(|| anyhow!("{} was cleared", F::NAME))
}

/// Unwrap a settled `Async`, turning failures back into typed errors
fn into_value<T>(value: libmixology::Async<T>) -> anyhow::Result<T> {
    if let Some(failure) = value.failure() {
        return Err(failure_error(failure));
    }
    value.into_value().ok_or_else(|| anyhow!("value not loaded"))
}

fn failure_error(failure: &Failure) -> anyhow::Error {
    let repository = failure.downcast_ref::<RepositoryError>().cloned().or_else(|| {
        match failure.downcast_ref::<MixologyError>() {
            Some(MixologyError::Repository(e)) => Some(e.clone()),
            _ => None,
        }
    });
    match repository {
        Some(e) => MixologyError::Repository(e).into(),
        None => anyhow!(failure.message().to_string()),
    }
}

/// Resolve `GROUP=VALUE` against the loaded facets
fn parse_filter(raw: &str, aggregation: &libmixology::Aggregation) -> anyhow::Result<SelectedFilter> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| MixologyError::InvalidInput(format!("filter '{}' is not GROUP=VALUE", raw)))?;

    let (_, group) = aggregation
        .named_groups()
        .into_iter()
        .find(|(group_name, _)| group_name.eq_ignore_ascii_case(name))
        .ok_or_else(|| MixologyError::InvalidInput(format!("unknown filter group '{}'", name)))?;
    let facet = group
        .iter()
        .find(|facet| facet.id == value)
        .ok_or_else(|| MixologyError::InvalidInput(format!("no '{}' value in {}", value, name)))?;

    Ok(SelectedFilter::new(group, facet.clone()))
}

fn heading(drink: &Drink) -> String {
    let marker = if drink.is_favorite { "*" } else { " " };
    format!("{} {:<18} {}", marker, drink.alias, drink.name)
}

fn drink_lines(drinks: &[Drink]) -> String {
    if drinks.is_empty() {
        return "No drinks found".to_string();
    }
    drinks.iter().map(heading).collect::<Vec<_>>().join("\n")
}

struct PrintingRouter {
    format: OutputFormat,
}

impl Router for PrintingRouter {
    fn navigate(&self, destination: Destination) {
        match self.format {
            OutputFormat::Json => match serde_json::to_string(&destination) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(error = %e, "Failed to encode destination"),
            },
            OutputFormat::Text => println!("{:?}", destination),
        }
    }
}
