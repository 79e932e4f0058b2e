use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use moderation_console::api::ApiError;
use moderation_console::config::ConsoleConfig;
use moderation_console::moderation::{
    Action, AutoConfirm, ConfirmationPrompt, ConfirmationTier, Confirmer, EntityKey, EntityKind,
    EntityStatus, ErrorClassifier, ModerableEntity, ModerationEngine, RefetchOutcome,
    TransitionOutcome, TransitionRegistry,
};
use moderation_console::session::CredentialSession;
use moderation_console::{init_telemetry, ListQuery, ModerationApi, RestModerationApi, SortOrder};

#[derive(Parser)]
#[command(name = "modconsole")]
#[command(about = "Admin moderation console for novels and categories")]
#[command(
    long_about = "Lists moderable content, shows which state transitions are available for \
                  each row, and runs them behind explicit confirmation. Irreversible actions \
                  ask twice."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the actions offered for an entity in a given state (offline)
    Actions {
        /// Entity kind: novel or category
        #[arg(long)]
        kind: EntityKind,
        /// Current status, e.g. UNDER_REVIEW or ACTIVE
        #[arg(long)]
        status: String,
        /// The novel is currently hidden
        #[arg(long)]
        hidden: bool,
        /// Number of dependent records attached to the entity
        #[arg(long, default_value = "0")]
        dependents: u32,
    },
    /// Fetch one page and print each row with its available actions
    List {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long, default_value = "1")]
        page: u32,
        /// Rows per page (defaults to the configured page size)
        #[arg(long)]
        page_size: Option<u32>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        order: Option<SortOrder>,
        /// Filter as key=value, repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },
    /// Run a transition on one entity after confirmation
    Transition {
        #[arg(long)]
        kind: EntityKind,
        #[arg(long)]
        id: u64,
        #[arg(long)]
        action: Action,
        /// Notes sent with approve / reject
        #[arg(long)]
        notes: Option<String>,
        /// Answer yes to every confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Classify a raw failure the way the console would (offline)
    Classify {
        /// HTTP status code of the failed response
        #[arg(long)]
        status: Option<u16>,
        /// Treat as a network failure (no response)
        #[arg(long, conflicts_with_all = ["status", "timeout"])]
        network: bool,
        /// Treat as a transport timeout
        #[arg(long, conflicts_with = "status")]
        timeout: bool,
        /// Raw server message
        #[arg(long)]
        message: String,
        /// Action that was being attempted
        #[arg(long)]
        action: Option<Action>,
        /// Print the classified error as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_filter(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got '{input}'")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    ConsoleConfig::load_env_file()?;
    let config = ConsoleConfig::load().context("Failed to load configuration")?;
    init_telemetry(&config.observability)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Actions {
            kind,
            status,
            hidden,
            dependents,
        } => actions_command(kind, &status, hidden, dependents),
        Commands::List {
            kind,
            page,
            page_size,
            sort,
            order,
            filters,
        } => {
            let mut query = config.listing.default_query().page(page);
            if let Some(size) = page_size {
                query = query.page_size(size);
            }
            if sort.is_some() || order.is_some() {
                let field = sort
                    .or_else(|| config.listing.sort.clone())
                    .unwrap_or_else(|| "updatedAt".to_string());
                query = query.sort(field, order.unwrap_or(config.listing.order));
            }
            for (key, value) in filters {
                query = query.filter(key, value);
            }
            runtime.block_on(async { list_command(&config, kind, query).await })
        }
        Commands::Transition {
            kind,
            id,
            action,
            notes,
            yes,
        } => runtime.block_on(async {
            transition_command(&config, EntityKey::new(kind, id), action, notes, yes).await
        }),
        Commands::Classify {
            status,
            network,
            timeout,
            message,
            action,
            json,
        } => {
            let failure = if network {
                ApiError::Network(message)
            } else if timeout {
                ApiError::timeout(message, Duration::from_secs(config.api.timeout_seconds))
            } else if let Some(status) = status {
                ApiError::http(status, message)
            } else {
                ApiError::rejected(message)
            };
            classify_command(&config, &failure, action, json)
        }
    }
}

fn actions_command(kind: EntityKind, status: &str, hidden: bool, dependents: u32) -> Result<()> {
    let status = EntityStatus::parse(kind, status)?;
    let entity = ModerableEntity {
        id: 0,
        kind,
        status,
        hidden: hidden && kind == EntityKind::Novel,
        dependent_resource_count: dependents,
        title: None,
    };

    let actions = TransitionRegistry::legal_actions_for(&entity);
    if actions.is_empty() {
        println!("No actions available for {} in status {}", kind, status);
        return Ok(());
    }

    println!(
        "Actions for {} in status {}{}:",
        kind,
        status,
        hidden_suffix(entity.hidden)
    );
    for action in actions {
        let tier = match TransitionRegistry::confirmation_tier(action) {
            ConfirmationTier::Standard => "confirm",
            ConfirmationTier::Escalated => "confirm twice",
        };
        let irreversible = if TransitionRegistry::is_irreversible(action) {
            ", irreversible"
        } else {
            ""
        };
        println!("  {:<14} [{}{}]", action, tier, irreversible);
    }
    if dependents > 0 && kind == EntityKind::Category {
        println!(
            "Note: {} dependent records; permanent deletion will be refused while they exist",
            dependents
        );
    }
    Ok(())
}

fn classify_command(
    config: &ConsoleConfig,
    failure: &ApiError,
    action: Option<Action>,
    json: bool,
) -> Result<()> {
    let classifier = ErrorClassifier::from_config(&config.classifier)?;
    let classified = classifier.classify(failure, action);

    if json {
        println!("{}", serde_json::to_string_pretty(&classified)?);
    } else {
        println!("Class:   {}", classified.class);
        println!("Message: {}", classified.raw_message);
        println!("Hint:    {}", classified.recovery_hint);
        if let Some(rule) = &classified.rule {
            println!("Rule:    {}", rule);
        }
    }
    Ok(())
}

fn build_engine(
    config: &ConsoleConfig,
    confirmer: Arc<dyn Confirmer>,
) -> Result<(Arc<RestModerationApi>, ModerationEngine)> {
    let token = config.api.token.clone().ok_or_else(|| {
        anyhow!("No API token configured. Set MODCONSOLE_TOKEN or api.token in modconsole.toml")
    })?;
    let session = Arc::new(CredentialSession::with_token(token)?);
    let api = Arc::new(RestModerationApi::new(&config.api, session.clone())?);
    let classifier = ErrorClassifier::from_config(&config.classifier)?;
    let engine = ModerationEngine::new(api.clone(), session, classifier, confirmer);
    Ok((api, engine))
}

async fn list_command(config: &ConsoleConfig, kind: EntityKind, query: ListQuery) -> Result<()> {
    let (_, engine) = build_engine(config, Arc::new(AutoConfirm))?;
    let view = engine.open_view(kind, query);
    let page = view
        .load()
        .await
        .map_err(|e| anyhow!("Failed to list {}: {}", kind.collection(), e))?;

    if page.data.is_empty() {
        println!(
            "No {} on page {} ({} in total)",
            kind.collection(),
            page.page,
            page.total
        );
        engine.close_view(kind);
        return Ok(());
    }

    let offset = page.page.saturating_sub(1) as u64 * page.page_size as u64;
    println!(
        "{} {}-{} of {} (page {})",
        kind.collection(),
        offset + 1,
        offset + page.data.len() as u64,
        page.total,
        page.page
    );
    for row in &page.data {
        let actions: Vec<String> = engine
            .affordances(row)
            .into_iter()
            .map(|affordance| {
                if affordance.irreversible {
                    format!("{}!", affordance.action)
                } else {
                    affordance.action.to_string()
                }
            })
            .collect();
        println!(
            "  {:<8} {:<14} {:<7} {:<40} {}",
            row.id,
            row.status,
            hidden_suffix(row.hidden).trim(),
            row.title.as_deref().unwrap_or("-"),
            actions.join(" ")
        );
    }
    engine.close_view(kind);
    Ok(())
}

async fn transition_command(
    config: &ConsoleConfig,
    key: EntityKey,
    action: Action,
    notes: Option<String>,
    yes: bool,
) -> Result<()> {
    let confirmer: Arc<dyn Confirmer> = if yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(TerminalConfirmer)
    };
    let (api, engine) = build_engine(config, confirmer)?;

    let entity = api
        .fetch_entity(key)
        .await
        .map_err(|e| anyhow!("Failed to fetch {}: {}", key, e))?;

    let view = engine.open_view(key.kind, config.listing.default_query());
    if let Err(e) = view.load().await {
        tracing::warn!(error = %e, "Could not load list view, continuing without refetch");
        engine.close_view(key.kind);
    }

    println!(
        "{} is {}{}",
        entity.label(),
        entity.status,
        hidden_suffix(entity.hidden)
    );
    println!("{} ...", capitalize(action.progress_label()));

    let outcome = engine.request_transition_with_notes(&entity, action, notes).await;
    engine.metrics().log_stats();

    match outcome {
        TransitionOutcome::Applied {
            entity: updated,
            refetch,
            ..
        } => {
            match updated {
                Some(updated) => println!(
                    "Done: {} is now {}{}",
                    updated.label(),
                    updated.status,
                    hidden_suffix(updated.hidden)
                ),
                None => println!("Done: {} {}", action, key),
            }
            match refetch {
                RefetchOutcome::Refreshed { present: false, .. } => {
                    println!("{} no longer matches the current list filter", key)
                }
                RefetchOutcome::Failed { error } => {
                    println!("List could not be refreshed ({}); rows may be stale", error)
                }
                _ => {}
            }
            Ok(())
        }
        TransitionOutcome::Cancelled { .. } => {
            println!("Cancelled, nothing was sent");
            Ok(())
        }
        TransitionOutcome::Busy { held, .. } => bail!("{} is busy ({} in progress)", key, held),
        TransitionOutcome::Rejected { reason } => bail!("{}", reason),
        TransitionOutcome::Failed { error, .. } => {
            eprintln!("{}: {}", error.class, error.raw_message);
            eprintln!("{}", error.recovery_hint);
            bail!("{} {} failed", action, key)
        }
    }
}

fn hidden_suffix(hidden: bool) -> &'static str {
    if hidden {
        " (hidden)"
    } else {
        ""
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Asks on the terminal; anything but an explicit yes declines
struct TerminalConfirmer;

#[async_trait]
impl Confirmer for TerminalConfirmer {
    async fn confirm(&self, prompt: &ConfirmationPrompt) -> bool {
        let prompt = prompt.clone();
        tokio::task::spawn_blocking(move || {
            let mut stdout = std::io::stdout();
            let _ = writeln!(stdout, "\n{}", prompt.title);
            let _ = writeln!(stdout, "{}", prompt.body);
            if let Some(warning) = &prompt.warning {
                let _ = writeln!(stdout, "Warning: {}", warning);
            }
            let _ = write!(stdout, "{} [y/N]: ", prompt.confirm_label);
            let _ = stdout.flush();

            let mut answer = String::new();
            match std::io::stdin().lock().read_line(&mut answer) {
                Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
                Err(_) => false,
            }
        })
        .await
        .unwrap_or(false)
    }
}
