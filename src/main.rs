use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use menubot::chat::{self, Conversation};
use menubot::config::{ChatConfig, GeminiConfig};
use menubot::constants;
use menubot::gemini::{GeminiClient, Generator, RetryPolicy, RetryingGenerator};
use menubot::locale::Locale;
use menubot::menu::MenuStore;
use menubot::preferences::{FilePreferenceStore, PreferenceStore};
use menubot::prompt;
use menubot::web_server::{self, AppState};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Menu file to use instead of the bundled menu.
    #[arg(long, global = true)]
    menu: Option<PathBuf>,
    /// Response language (id, en). Defaults to the saved preference.
    #[arg(long, global = true)]
    lang: Option<String>,
    /// Where preferences are stored.
    #[arg(long, global = true, env = "MENUBOT_PREFS", default_value = constants::PREFERENCES_PATH.as_str())]
    prefs: PathBuf,
    /// Generation endpoint URL.
    #[arg(long, global = true, env = "GEMINI_API_URL", default_value = constants::GEMINI_API_URL.as_str())]
    api_url: String,
    /// API key for the generation endpoint.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,
    /// Request timeout in seconds.
    #[arg(long, global = true, default_value_t = constants::REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,
    /// Retries for transient generation failures.
    #[arg(long, global = true, default_value_t = constants::MAX_RETRIES)]
    max_retries: usize,
    #[command(subcommand)]
    command: Commands,
}

// Define the available subcommands
#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the web chat server.
    Serve {
        #[arg(long, default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
        #[arg(long, default_value = "0.0.0.0", help = "Address to bind.")]
        host: IpAddr,
        #[arg(long, default_value = "templates", help = "Directory holding the page templates.")]
        templates: PathBuf,
        #[arg(long, default_value = "static", help = "Directory served under /static.")]
        static_dir: PathBuf,
    },
    /// Chat about the menu in the terminal.
    Chat,
    /// Print the prompt that would be sent for a question.
    Prompt {
        /// The customer's question.
        question: String,
    },
    /// List the menu.
    Menu,
    /// Save a preference.
    Set {
        #[command(subcommand)]
        target: SetCommands,
    },
}

#[derive(clap::Subcommand, Debug)]
enum SetCommands {
    /// Default response language (id, en).
    Locale { value: String },
    /// Colour scheme: on, off or system.
    DarkMode {
        #[arg(value_parser = ["on", "off", "system"])]
        value: String,
    },
}

impl Cli {
    fn load_menu(&self) -> Result<MenuStore> {
        match &self.menu {
            Some(path) => MenuStore::from_path(path).context("Failed to load menu file"),
            None => MenuStore::bundled().context("Bundled menu is invalid"),
        }
    }

    fn resolve_locale(&self, preferences: &dyn PreferenceStore) -> Locale {
        match &self.lang {
            Some(tag) => Locale::parse_or_default(tag),
            None => preferences
                .load()
                .map(|prefs| prefs.locale_or_default())
                .unwrap_or_else(|e| {
                    error!("Failed to load preferences: {}", e);
                    Locale::default()
                }),
        }
    }

    fn generator(&self) -> Result<Arc<dyn Generator>> {
        let config = GeminiConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        };
        if config.api_key.is_empty() {
            error!("GEMINI_API_KEY is not set; every question will get the error reply");
        }
        let client = GeminiClient::new(&config).context("Failed to build generation client")?;
        Ok(Arc::new(RetryingGenerator::new(client, config.retry)))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for GEMINI_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g. RUST_LOG=info,menubot=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("menubot starting with command: {:?}", cli.command);

    let preferences: Arc<dyn PreferenceStore> = Arc::new(FilePreferenceStore::new(&cli.prefs));

    match &cli.command {
        Commands::Serve {
            port,
            host,
            templates,
            static_dir,
        } => {
            let menu = Arc::new(cli.load_menu()?);
            let state = AppState::new(
                templates.clone(),
                menu,
                cli.generator()?,
                preferences,
                ChatConfig::default(),
            );
            let addr = SocketAddr::new(*host, *port);

            let server = web_server::start_web_server(addr, state, static_dir.clone());
            tokio::select! {
                res = server => res?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, shutting down.");
                }
            }
        }
        Commands::Chat => {
            let menu = Arc::new(cli.load_menu()?);
            let locale = cli.resolve_locale(preferences.as_ref());
            let conversation = Conversation::new(menu, ChatConfig::default(), locale);
            chat::run_terminal_chat(conversation, cli.generator()?, preferences)
                .await
                .context("Chat session failed")?;
        }
        Commands::Prompt { question } => {
            let menu = cli.load_menu()?;
            let locale = cli.resolve_locale(preferences.as_ref());
            print!("{}", prompt::build_prompt(menu.items(), question, &[], locale));
        }
        Commands::Menu => {
            let menu = cli.load_menu()?;
            let locale = cli.resolve_locale(preferences.as_ref());
            for item in menu.items() {
                println!(
                    "{} [{}] {}\n    {}",
                    item.name,
                    item.category,
                    locale.format_price(item.price),
                    item.composition
                );
            }
        }
        Commands::Set { target } => {
            let mut prefs = preferences.load().context("Failed to load preferences")?;
            match target {
                SetCommands::Locale { value } => {
                    let locale: Locale = value.parse()?;
                    prefs.locale = Some(locale);
                    println!("Locale set to {}", locale);
                }
                SetCommands::DarkMode { value } => {
                    prefs.dark_mode = match value.as_str() {
                        "on" => Some(true),
                        "off" => Some(false),
                        _ => None,
                    };
                    println!("Dark mode set to {}", value);
                }
            }
            preferences.save(&prefs).context("Failed to save preferences")?;
        }
    }

    Ok(())
}
