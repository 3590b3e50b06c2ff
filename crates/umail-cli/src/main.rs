//! umail: hide a message in MIME boundaries with a one-time pad
//!
//! Key commands:
//!   key create <name> <source>     - create a pool from a file of random bytes
//!   key create <name> --random N   - create a pool from N bytes of OS randomness
//!   key info <name>                - show cursor, remaining bytes, fingerprint
//!   key reset <name> <position>    - move the pool cursor (rewinding needs --force)
//!
//! Session commands:
//!   session create <name> --key <pool> --message <file>
//!   session info <name>
//!   session next <name>            - print the next boundary to send
//!   session mark-sent <name>       - record one delivered boundary
//!   session reset <name>           - resend from the first boundary
//!
//!   reveal --key <pool> <boundary>...  - decode received boundaries

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use umail_core::config::{expand_tilde, UmailConfig};
use umail_core::types::validate_name;
use umail_otp::{boundary, KeyPool};
use umail_session::{Session, SessionStatus, SessionStore};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "umail",
    version,
    about = "One-time-pad messages hidden in email boundaries",
    long_about = "umail: manage one-time-pad key pools and mailing sessions whose \
                  ciphertext travels as MIME boundary strings"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, short = 'c', env = "UMAIL_CONFIG", default_value = "~/.smailer/config.toml")]
    config: PathBuf,

    /// Application state directory (overrides config)
    #[arg(long, env = "UMAIL_HOME")]
    home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "UMAIL_LOG")]
    log: Option<String>,

    /// Log format; overrides config
    #[arg(long, env = "UMAIL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the application, key, and session directories
    Info,

    /// Key pool management
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },

    /// Mailing session management
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Decode received boundaries with a local key pool
    ///
    /// Boundaries must be given in the order they were sent. Key bytes are
    /// consumed from the pool exactly as on the sending side.
    Reveal {
        /// Key pool name
        #[arg(long, short = 'k', default_value = "key")]
        key: String,
        /// Hex boundaries, in send order
        #[arg(required = true)]
        boundaries: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum KeyAction {
    /// Create a key pool from a file or from OS randomness
    Create {
        /// Pool name
        name: String,
        /// File holding the key material
        #[arg(required_unless_present = "random", conflicts_with = "random")]
        source: Option<PathBuf>,
        /// Generate this many random bytes instead of copying a file
        #[arg(long)]
        random: Option<u64>,
    },

    /// Show a pool's cursor and remaining key material
    Info {
        /// Pool name
        name: String,
    },

    /// Overwrite a pool's cursor
    ///
    /// Moving the cursor backwards re-exposes key bytes that were already
    /// used; anything encrypted with them twice is no longer secret.
    Reset {
        /// Pool name
        name: String,
        /// New cursor position (key bytes consumed)
        position: u64,
        /// Allow moving the cursor backwards
        #[arg(long)]
        force: bool,
    },

    /// List key pools
    List,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Encrypt a message into a new session
    Create {
        /// Session name
        name: String,
        /// Key pool name
        #[arg(long, short = 'k', default_value = "key")]
        key: String,
        /// Path to the message file
        #[arg(long, short = 'm', default_value = "message.txt")]
        message: PathBuf,
    },

    /// Show a session's provenance, boundaries, and progress
    Info {
        /// Session name
        name: String,
    },

    /// Print the next boundary to send
    Next {
        /// Session name
        name: String,
    },

    /// Record that the next boundary was delivered
    #[command(name = "mark-sent")]
    MarkSent {
        /// Session name
        name: String,
    },

    /// Restart delivery from the first boundary (no new key material)
    Reset {
        /// Session name
        name: String,
    },

    /// List sessions
    List,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        home = %config.home().display(),
        "umail starting"
    );

    config.ensure_dirs().context("setting up application directories")?;

    match cli.command {
        Commands::Info => cmd_info(&config),
        Commands::Key { action } => match action {
            KeyAction::Create { name, source, random } => {
                cmd_key_create(&config, &name, source.as_deref(), random)
            }
            KeyAction::Info { name } => cmd_key_info(&config, &name),
            KeyAction::Reset { name, position, force } => {
                cmd_key_reset(&config, &name, position, force)
            }
            KeyAction::List => cmd_key_list(&config),
        },
        Commands::Session { action } => match action {
            SessionAction::Create { name, key, message } => {
                cmd_session_create(&config, &name, &key, &message)
            }
            SessionAction::Info { name } => cmd_session_info(&config, &name),
            SessionAction::Next { name } => cmd_session_next(&config, &name),
            SessionAction::MarkSent { name } => cmd_session_mark_sent(&config, &name),
            SessionAction::Reset { name } => cmd_session_reset(&config, &name),
            SessionAction::List => cmd_session_list(&config),
        },
        Commands::Reveal { key, boundaries } => cmd_reveal(&config, &key, &boundaries),
    }
}

// ── Config + logging ──────────────────────────────────────────────────────────

fn load_config(cli: &Cli) -> Result<UmailConfig> {
    let path = expand_tilde(&cli.config);
    let mut config = UmailConfig::load(&path)
        .with_context(|| format!("loading config: {}", path.display()))?;
    if let Some(home) = &cli.home {
        config.storage.home = home.clone();
    }
    Ok(config)
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let layer = fmt::layer().with_writer(std::io::stderr);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .init();
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn pool_path(config: &UmailConfig, name: &str) -> Result<PathBuf> {
    validate_name(name).context("invalid key name")?;
    Ok(config.keys_dir().join(name))
}

fn open_pool(config: &UmailConfig, name: &str) -> Result<KeyPool> {
    let path = pool_path(config, name)?;
    KeyPool::open(&path).with_context(|| format!("opening key \"{name}\" ({})", path.display()))
}

fn session_store(config: &UmailConfig) -> SessionStore {
    SessionStore::new(&config.sessions_dir())
}

fn load_session(store: &SessionStore, name: &str) -> Result<Session> {
    store
        .load(name)
        .with_context(|| format!("loading session \"{name}\""))
}

fn fmt_status(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Created => "created",
        SessionStatus::InProgress => "in progress",
        SessionStatus::Complete => "complete",
    }
}

// ── `umail info` ──────────────────────────────────────────────────────────────

fn cmd_info(config: &UmailConfig) -> Result<()> {
    println!("Application directory: \"{}\"", config.home().display());
    println!("Session directory:     \"{}\"", config.sessions_dir().display());
    println!("Key directory:         \"{}\"", config.keys_dir().display());
    println!("Chunk length:          {} bytes", config.otp.chunk_length);
    Ok(())
}

// ── `umail key ...` ───────────────────────────────────────────────────────────

fn cmd_key_create(
    config: &UmailConfig,
    name: &str,
    source: Option<&Path>,
    random: Option<u64>,
) -> Result<()> {
    let path = pool_path(config, name)?;

    let pool = match (source, random) {
        (_, Some(len)) => KeyPool::create_random(&path, len)
            .with_context(|| format!("creating key \"{name}\" from {len} random bytes"))?,
        (Some(src), None) => {
            let file = std::fs::File::open(src)
                .with_context(|| format!("opening key source: {}", src.display()))?;
            KeyPool::create(&path, file).with_context(|| {
                format!("creating key \"{name}\" ({}) from {}", path.display(), src.display())
            })?
        }
        (None, None) => anyhow::bail!("either a source file or --random <bytes> is required"),
    };

    println!("Created key \"{name}\"");
    println!("  file:        {}", pool.path().display());
    println!("  key bytes:   {}", pool.len());
    println!("  fingerprint: {}", pool.fingerprint().context("hashing key material")?);
    Ok(())
}

fn cmd_key_info(config: &UmailConfig, name: &str) -> Result<()> {
    let pool = open_pool(config, name)?;

    println!("file: \"{}\"", pool.path().display());
    println!("current read position: {}", pool.current_offset());
    println!("remaining key bytes:   {}", pool.remaining());
    println!("total key bytes:       {}", pool.len());
    println!(
        "boundaries left:       {}",
        pool.remaining() / config.otp.chunk_length as u64
    );
    println!("fingerprint:           {}", pool.fingerprint().context("hashing key material")?);
    Ok(())
}

fn cmd_key_reset(config: &UmailConfig, name: &str, position: u64, force: bool) -> Result<()> {
    let mut pool = open_pool(config, name)?;
    let current = pool.current_offset();

    pool.reposition(position, force)
        .with_context(|| format!("setting the position of key \"{name}\" (pass --force to rewind)"))?;
    println!("Key \"{name}\": read position {current} → {position}");
    Ok(())
}

fn cmd_key_list(config: &UmailConfig) -> Result<()> {
    let dir = config.keys_dir();
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    for name in names {
        match KeyPool::open(&dir.join(&name)) {
            Ok(pool) => println!("{name:<24} {:>12} / {:<12} bytes used", pool.current_offset(), pool.len()),
            Err(e) => println!("{name:<24} unreadable: {e}"),
        }
    }
    Ok(())
}

// ── `umail session ...` ───────────────────────────────────────────────────────

fn cmd_session_create(config: &UmailConfig, name: &str, key: &str, message: &Path) -> Result<()> {
    let store = session_store(config);
    let mut pool = open_pool(config, key)?;

    let file = std::fs::File::open(message)
        .with_context(|| format!("opening message file: {}", message.display()))?;
    let payload = umail_otp::read_payload(file)
        .with_context(|| format!("reading message file: {}", message.display()))?;

    let session = umail_session::mailing::create_session(
        &store,
        &mut pool,
        name,
        &payload,
        config.otp.chunk_length,
    )
    .with_context(|| format!("creating session \"{name}\" with key \"{key}\""))?;

    println!("Created session \"{name}\"");
    println!("  key:        \"{key}\" at {}", session.pool_position());
    println!("  message:    {} bytes", payload.len());
    println!("  boundaries: {}", session.total());
    Ok(())
}

fn cmd_session_info(config: &UmailConfig, name: &str) -> Result<()> {
    let store = session_store(config);
    let session = load_session(&store, name)?;

    println!("name: \"{name}\" ({})", store.path_for(name)?.display());
    println!(
        "pool: \"{}\" ({}) at {}",
        session.pool_name(),
        config.keys_dir().join(session.pool_name()).display(),
        session.pool_position()
    );
    println!("status: {}", fmt_status(session.status()));
    println!("email sent: {}", session.progress());
    println!("boundaries ({}):", session.total());
    for (i, b) in session.boundaries().iter().enumerate() {
        let bytes: Vec<String> = b.iter().map(u8::to_string).collect();
        println!("[{i:3}]  [{}] (len: {})", bytes.join(", "), b.len());
        println!("       => \"{}\"", boundary::encode(b));
    }
    println!("number of emails to send: {}", session.remaining());
    Ok(())
}

fn cmd_session_next(config: &UmailConfig, name: &str) -> Result<()> {
    let store = session_store(config);
    let session = load_session(&store, name)?;

    match session.next_boundary() {
        Some(b) => {
            println!("{}", boundary::encode(b));
            Ok(())
        }
        None => anyhow::bail!(
            "the session \"{name}\" has already been processed ({} boundaries sent)",
            session.total()
        ),
    }
}

fn cmd_session_mark_sent(config: &UmailConfig, name: &str) -> Result<()> {
    let store = session_store(config);
    let mut session = load_session(&store, name)?;

    session.advance()?;
    store
        .persist(&session)
        .with_context(|| format!("updating session \"{name}\""))?;

    println!(
        "Number of emails sent: {} (over {})",
        session.progress(),
        session.total()
    );
    if session.status() == SessionStatus::Complete {
        println!("The session has been entirely processed.");
    }
    Ok(())
}

fn cmd_session_reset(config: &UmailConfig, name: &str) -> Result<()> {
    let store = session_store(config);
    let mut session = load_session(&store, name)?;

    session.reset_progress();
    store
        .persist(&session)
        .with_context(|| format!("updating session \"{name}\""))?;
    println!("Session \"{name}\" reset: {} boundaries to send", session.remaining());
    Ok(())
}

fn cmd_session_list(config: &UmailConfig) -> Result<()> {
    let store = session_store(config);
    for name in store.list()? {
        match store.load(&name) {
            Ok(s) => println!(
                "{name:<24} {:>4}/{:<4} {:<12} key \"{}\" at {}",
                s.progress(),
                s.total(),
                fmt_status(s.status()),
                s.pool_name(),
                s.pool_position()
            ),
            Err(e) => println!("{name:<24} unreadable: {e}"),
        }
    }
    Ok(())
}

// ── `umail reveal` ────────────────────────────────────────────────────────────

fn cmd_reveal(config: &UmailConfig, key: &str, boundaries: &[String]) -> Result<()> {
    let decoded = boundaries
        .iter()
        .map(|b| boundary::decode(b))
        .collect::<Result<Vec<_>, _>>()
        .context("decoding boundaries")?;

    let mut pool = open_pool(config, key)?;
    let start = pool.current_offset();
    let payload = umail_otp::reveal(&mut pool, &decoded, config.otp.chunk_length)
        .with_context(|| format!("revealing message with key \"{key}\" at {start}"))?;

    println!("Length of the (hidden) message: {}", payload.len());
    println!("The hidden message is:\n");
    println!("{}", String::from_utf8_lossy(&payload));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_session_create_defaults() {
        let cli = Cli::try_parse_from(["umail", "session", "create", "first-session"]).unwrap();
        match cli.command {
            Commands::Session {
                action: SessionAction::Create { name, key, message },
            } => {
                assert_eq!(name, "first-session");
                assert_eq!(key, "key");
                assert_eq!(message, PathBuf::from("message.txt"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn key_create_needs_exactly_one_source() {
        assert!(Cli::try_parse_from(["umail", "key", "create", "k"]).is_err());
        assert!(Cli::try_parse_from(["umail", "key", "create", "k", "f.bin", "--random", "10"]).is_err());
        assert!(Cli::try_parse_from(["umail", "key", "create", "k", "--random", "10"]).is_ok());
        assert!(Cli::try_parse_from(["umail", "key", "create", "k", "f.bin"]).is_ok());
    }

    #[test]
    fn reveal_requires_boundaries() {
        assert!(Cli::try_parse_from(["umail", "reveal", "--key", "k"]).is_err());
        assert!(Cli::try_parse_from(["umail", "reveal", "abcd", "ef01"]).is_ok());
    }
}
