//! API Vault CLI
//!
//! Manages templates, encrypted credentials and instances in a local data
//! directory, and executes template endpoints. Results are printed to stdout
//! as JSON; logs go to stderr.
//!
//! The encryption key is given as 64 hex characters (`--encryption-key` /
//! `API_VAULT_ENCRYPTION_KEY`) or derived from a passphrase (`--passphrase` /
//! `API_VAULT_PASSPHRASE`). Template and settings commands need neither.

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use api_executor::{
    ApiExecutor, CustomAuthHandler, EndpointSelector, ExecutionRequest, HeaderCopyHandler,
    PreparedTemplate,
};
use api_template::{ApiTemplate, HttpMethod};
use vault_core::{
    derive_key, generate_salt, CredentialMaterial, CredentialVault, EncryptionKey, FileStorage,
    InstanceRegistry, RecordStorage, SettingsManager, TemplateRegistry, VaultError,
};

/// API Vault - encrypted API credentials and template-driven API calls
#[derive(Parser, Debug)]
#[command(name = "api-vault")]
#[command(version)]
#[command(about = "API Vault - encrypted API credentials and template-driven API calls")]
struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "API_VAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Encryption key as 64 hex characters
    #[arg(long, global = true, env = "API_VAULT_ENCRYPTION_KEY", hide_env_values = true)]
    encryption_key: Option<String>,

    /// Passphrase to derive the encryption key from
    #[arg(long, global = true, env = "API_VAULT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage API templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// Manage encrypted credentials
    #[command(subcommand)]
    Credential(CredentialCommand),
    /// Manage API instances
    #[command(subcommand)]
    Instance(InstanceCommand),
    /// Call a template endpoint
    Execute(ExecuteArgs),
    /// Show or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    /// Change settings; omitted values are kept
    Set {
        /// Default request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Restore the defaults
    Reset,
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Register a template from a JSON or YAML file
    Add { file: PathBuf },
    List,
    /// Export a template as an OpenAPI 3.0 document
    Export {
        id: Uuid,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
    },
    Remove { id: Uuid },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Json,
    Yaml,
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
    /// Store a credential read from a JSON file (`-` for stdin)
    Add {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        created_by: Option<String>,
        #[arg(long)]
        file: PathBuf,
    },
    List {
        #[arg(long)]
        org: Option<Uuid>,
    },
    Rename { id: Uuid, name: String },
    /// Replace the secret material, re-encrypting it
    Update {
        id: Uuid,
        #[arg(long)]
        file: PathBuf,
    },
    Delete { id: Uuid },
}

#[derive(Subcommand, Debug)]
enum InstanceCommand {
    Add {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        template: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        credential: Option<Uuid>,
    },
    List {
        #[arg(long)]
        org: Option<Uuid>,
    },
    Delete { id: Uuid },
}

#[derive(Args, Debug)]
struct ExecuteArgs {
    /// Instance supplying the template and credential
    #[arg(long, conflicts_with_all = ["template", "credential"])]
    instance: Option<Uuid>,

    #[arg(long, required_unless_present = "instance")]
    template: Option<Uuid>,

    #[arg(long)]
    credential: Option<Uuid>,

    /// Endpoint name
    #[arg(long, conflicts_with = "path")]
    endpoint: Option<String>,

    #[arg(long, default_value = "GET")]
    method: HttpMethod,

    /// Endpoint path as declared in the template, e.g. /users/{id}
    #[arg(long, required_unless_present = "endpoint")]
    path: Option<String>,

    /// Parameter as name=value (repeatable)
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Header as "Name: value" (repeatable)
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// JSON request body
    #[arg(long)]
    body: Option<String>,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {}", raw))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once(':')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .ok_or_else(|| format!("expected \"Name: value\", got {}", raw))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("Failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn read_material(path: &Path) -> anyhow::Result<CredentialMaterial> {
    serde_json::from_str(&read_input(path)?).context("Invalid credential JSON")
}

struct App {
    storage: Arc<FileStorage>,
    encryption_key: Option<String>,
    passphrase: Option<String>,
}

impl App {
    fn records(&self) -> Arc<dyn RecordStorage> {
        self.storage.clone()
    }

    async fn templates(&self) -> anyhow::Result<TemplateRegistry> {
        let registry = TemplateRegistry::new(self.records());
        registry.load().await?;
        Ok(registry)
    }

    fn instances(&self) -> InstanceRegistry {
        InstanceRegistry::new(self.records())
    }

    /// Resolve the key and check it against the one the store was created with
    async fn key(&self) -> anyhow::Result<EncryptionKey> {
        let key = if let Some(hex) = &self.encryption_key {
            EncryptionKey::from_hex(hex)?
        } else if let Some(passphrase) = &self.passphrase {
            let salt = match self.storage.load_salt().await? {
                Some(salt) => salt,
                None => {
                    let salt = generate_salt();
                    self.storage.save_salt(&salt).await?;
                    salt
                }
            };
            derive_key(passphrase, &salt, None)?
        } else {
            return Err(VaultError::MissingEncryptionKey.into());
        };

        match self.storage.verify_key(&key).await? {
            Some(true) => {}
            Some(false) => bail!("Encryption key does not match this data directory"),
            None => {
                self.storage.save_key_check(&key).await?;
                info!("Recorded key check for new data directory");
            }
        }

        Ok(key)
    }

    async fn vault(&self) -> anyhow::Result<CredentialVault> {
        Ok(CredentialVault::new(self.records(), self.key().await?))
    }

    async fn run_template(&self, command: TemplateCommand) -> anyhow::Result<()> {
        let templates = self.templates().await?;

        match command {
            TemplateCommand::Add { file } => {
                let template = ApiTemplate::from_str_any(&read_input(&file)?)?;
                print_json(&templates.add(template).await?)
            }
            TemplateCommand::List => print_json(&templates.list().await),
            TemplateCommand::Export { id, format } => {
                let template = templates
                    .get(id)
                    .await?
                    .ok_or(VaultError::TemplateNotFound(id))?;
                let document = template.to_openapi();
                let rendered = match format {
                    ExportFormat::Json => document.to_json_pretty()?,
                    ExportFormat::Yaml => document.to_yaml()?,
                };
                println!("{}", rendered);
                Ok(())
            }
            TemplateCommand::Remove { id } => {
                templates.remove(id).await?;
                print_json(&serde_json::json!({ "removed": id }))
            }
        }
    }

    async fn run_credential(&self, command: CredentialCommand) -> anyhow::Result<()> {
        let vault = self.vault().await?;

        match command {
            CredentialCommand::Add {
                org,
                name,
                created_by,
                file,
            } => {
                let material = read_material(&file)?;
                let descriptor = vault
                    .create(org, &name, created_by.as_deref(), material)
                    .await?;
                print_json(&descriptor)
            }
            CredentialCommand::List { org } => print_json(&vault.list(org).await?),
            CredentialCommand::Rename { id, name } => print_json(&vault.rename(id, &name).await?),
            CredentialCommand::Update { id, file } => {
                let material = read_material(&file)?;
                print_json(&vault.update_material(id, material).await?)
            }
            CredentialCommand::Delete { id } => {
                vault.delete(id).await?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        }
    }

    async fn run_instance(&self, command: InstanceCommand) -> anyhow::Result<()> {
        let instances = self.instances();

        match command {
            InstanceCommand::Add {
                org,
                template,
                name,
                credential,
            } => print_json(&instances.create(org, template, &name, credential).await?),
            InstanceCommand::List { org } => print_json(&instances.list(org).await?),
            InstanceCommand::Delete { id } => {
                instances.remove(id).await?;
                print_json(&serde_json::json!({ "deleted": id }))
            }
        }
    }

    async fn run_settings(&self, command: SettingsCommand) -> anyhow::Result<()> {
        let mut manager = SettingsManager::new(self.storage.storage_dir());

        match command {
            SettingsCommand::Show => {}
            SettingsCommand::Set {
                timeout_ms,
                user_agent,
            } => {
                let mut settings = manager.get().clone();
                if let Some(timeout_ms) = timeout_ms {
                    settings.default_timeout_ms = timeout_ms;
                }
                if let Some(user_agent) = user_agent {
                    settings.user_agent = user_agent;
                }
                manager.update(settings).await?;
            }
            SettingsCommand::Reset => manager.reset().await?,
        }

        print_json(manager.get())
    }

    /// Returns whether the call produced a success envelope
    async fn run_execute(&self, args: ExecuteArgs) -> anyhow::Result<bool> {
        let (template_id, credential_id) = match args.instance {
            Some(instance_id) => {
                let instance = self
                    .instances()
                    .get(instance_id)
                    .await?
                    .ok_or(VaultError::InstanceNotFound(instance_id))?;
                if !instance.is_active() {
                    bail!("Instance {} is disabled", instance_id);
                }
                (instance.template_id, instance.credential_id)
            }
            None => (
                args.template
                    .ok_or_else(|| anyhow!("--template or --instance is required"))?,
                args.credential,
            ),
        };

        let template = self
            .templates()
            .await?
            .get(template_id)
            .await?
            .ok_or(VaultError::TemplateNotFound(template_id))?;
        let custom_handler: Arc<dyn CustomAuthHandler> = Arc::new(HeaderCopyHandler);
        let prepared = PreparedTemplate::with_custom_handler(template, Some(custom_handler));

        let selector = match (args.endpoint, args.path) {
            (Some(name), _) => EndpointSelector::Name(name),
            (None, Some(path)) => EndpointSelector::route(args.method, &path),
            (None, None) => bail!("--endpoint or --path is required"),
        };

        let mut request = ExecutionRequest::new(selector);
        for (name, value) in args.params {
            request = request.with_param(&name, value);
        }
        for (name, value) in &args.headers {
            request = request.with_header(name, value);
        }
        if let Some(body) = args.body {
            let body: Value = serde_json::from_str(&body).context("Invalid JSON body")?;
            request = request.with_body(body);
        }
        request.credential_id = credential_id;

        let settings = SettingsManager::new(self.storage.storage_dir());
        let vault = Arc::new(self.vault().await?);
        let executor = ApiExecutor::new(vault, settings.get())?;

        let result = executor.execute(&prepared, request).await;
        print_json(&result)?;
        Ok(result.is_success())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => FileStorage::default_dir()?,
    };
    let storage = FileStorage::open(&data_dir)
        .await
        .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

    let app = App {
        storage: Arc::new(storage),
        encryption_key: cli.encryption_key,
        passphrase: cli.passphrase,
    };

    match cli.command {
        Command::Template(command) => app.run_template(command).await?,
        Command::Credential(command) => app.run_credential(command).await?,
        Command::Instance(command) => app.run_instance(command).await?,
        Command::Settings(command) => app.run_settings(command).await?,
        Command::Execute(args) => {
            if !app.run_execute(args).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
