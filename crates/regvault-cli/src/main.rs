//! regvault: student registration client
//!
//! Commands:
//!   register --full-name .. --email .. [field flags]  - encrypt and submit a registration
//!   list [--search TERM] [--raw]                      - fetch and decrypt recent students
//!   update <id> [field flags]                         - merge fields into a record and resubmit
//!   delete <id>                                       - remove a record
//!   login --email .. [--password ..]                  - check credentials
//!   encrypt <value> / decrypt <ciphertext>            - field cipher utilities

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use regvault_cli::form::{prepare_update, validate_login, StudentRow, StudentUpdate};
use regvault_cli::{ApiClient, DEFAULT_API};
use regvault_core::config::DEFAULT_CLIENT_SECRET;
use regvault_core::types::{field_text, validate_registration};
use regvault_crypto::FieldCipher;

#[derive(Parser, Debug)]
#[command(
    name = "regvault",
    version,
    about = "regvault student registration client",
    long_about = "regvault: register, list, update and delete students. Every field is \
                  encrypted locally with the client secret before it is sent."
)]
struct Cli {
    /// API base URL
    #[arg(long, env = "REGVAULT_API", default_value = DEFAULT_API)]
    api: String,

    /// Client field secret
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true, default_value = DEFAULT_CLIENT_SECRET)]
    client_secret: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REGVAULT_LOG", default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt every form field and register a student
    Register {
        #[command(flatten)]
        fields: StudentUpdate,
    },

    /// List the most recent students, decrypted locally
    List {
        /// Case-insensitive filter on name, email and course
        #[arg(long, short = 's')]
        search: Option<String>,
        /// Print the listing as returned by the server (still field-encrypted)
        #[arg(long)]
        raw: bool,
    },

    /// Change fields of a student; untouched fields are kept
    Update {
        id: String,
        #[command(flatten)]
        fields: StudentUpdate,
    },

    /// Delete a student
    Delete { id: String },

    /// Check credentials against registered students
    Login {
        #[arg(long)]
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Encrypt a value with the field cipher
    Encrypt { value: String },

    /// Decrypt a field ciphertext
    Decrypt { ciphertext: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log);

    let cipher = FieldCipher::new(cli.client_secret.clone());

    match cli.command {
        Commands::Register { fields } => cmd_register(&cli.api, &cipher, &fields).await,
        Commands::List { search, raw } => {
            cmd_list(&cli.api, &cipher, search.as_deref(), raw).await
        }
        Commands::Update { id, fields } => cmd_update(&cli.api, &cipher, &id, &fields).await,
        Commands::Delete { id } => cmd_delete(&cli.api, &id).await,
        Commands::Login { email, password } => {
            cmd_login(&cli.api, &email, password.as_deref()).await
        }
        Commands::Encrypt { value } => {
            println!("{}", cipher.encrypt_field(&serde_json::Value::String(value)));
            Ok(())
        }
        Commands::Decrypt { ciphertext } => {
            let plain = cipher
                .decrypt_field(&ciphertext)
                .context("decrypting field (wrong CLIENT_SECRET?)")?;
            println!("{}", field_text(&plain));
            Ok(())
        }
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── `regvault register` ───────────────────────────────────────────────────────

async fn cmd_register(api: &str, cipher: &FieldCipher, fields: &StudentUpdate) -> Result<()> {
    let plain = fields.to_registration();
    validate_registration(&plain).context("name and email are required")?;

    let client = ApiClient::new(api)?;
    let ack = client
        .register(&cipher.encrypt_object(&plain))
        .await
        .context("registering student")?;
    println!("{}  {}", ack.id, ack.message);
    Ok(())
}

// ── `regvault list` ───────────────────────────────────────────────────────────

async fn cmd_list(api: &str, cipher: &FieldCipher, search: Option<&str>, raw: bool) -> Result<()> {
    let client = ApiClient::new(api)?;
    let items = client.list().await.context("fetching students")?;

    if raw {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    let term = search.unwrap_or_default();
    let rows: Vec<StudentRow> = items
        .iter()
        .map(|item| StudentRow::decrypt(cipher, item))
        .filter(|row| row.matches(term))
        .collect();

    if rows.is_empty() {
        println!("No students found");
    }
    for row in &rows {
        println!("{}", row.render());
    }
    if !term.is_empty() {
        println!("Showing {} of {} students matching \"{term}\"", rows.len(), items.len());
    } else {
        println!("Showing {} students", rows.len());
    }
    Ok(())
}

// ── `regvault update` ─────────────────────────────────────────────────────────

async fn cmd_update(
    api: &str,
    cipher: &FieldCipher,
    id: &str,
    changes: &StudentUpdate,
) -> Result<()> {
    if changes.is_empty() {
        bail!("nothing to update: pass at least one field flag");
    }

    let client = ApiClient::new(api)?;
    let items = client.list().await.context("fetching students")?;
    let current = items
        .iter()
        .find(|item| item.id() == id)
        .with_context(|| format!("student {id} not found in the recent listing"))?;

    let sealed = prepare_update(cipher, current, changes)?;

    let ack = client
        .update(id, &sealed)
        .await
        .with_context(|| format!("updating student {id}"))?;
    println!("{}  {}", ack.id, ack.message);
    Ok(())
}

// ── `regvault delete` ─────────────────────────────────────────────────────────

async fn cmd_delete(api: &str, id: &str) -> Result<()> {
    let client = ApiClient::new(api)?;
    let ack = client
        .delete(id)
        .await
        .with_context(|| format!("deleting student {id}"))?;
    println!("{}  {}", ack.id, ack.message);
    Ok(())
}

// ── `regvault login` ──────────────────────────────────────────────────────────

async fn cmd_login(api: &str, email: &str, password: Option<&str>) -> Result<()> {
    let password = match password {
        Some(p) => p.to_string(),
        None => rpassword::prompt_password("Password: ").context("reading password")?,
    };
    validate_login(email, &password).map_err(anyhow::Error::msg)?;

    let client = ApiClient::new(api)?;
    let ack = client.login(email, &password).await.context("login")?;
    println!("{}  {}", ack.message, ack.id);
    Ok(())
}

