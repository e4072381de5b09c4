//! PKI Lifecycle - command-line front end
//!
//! Drives the CA lifecycle against the configured signing backend:
//! Root CA → Intermediate CA → Leaf certificates, plus listing, search,
//! revocation, CRL regeneration and PKCS#12 export.
//!
//! # Quick Start
//!
//! ```bash
//! export VAULT_TOKEN=...
//! pki-lifecycle init-root --base jimsnet --client abc --ttl 87600h
//! pki-lifecycle init-intermediate --base jimsnet --client abc --vendor vendor1
//! pki-lifecycle issue "John Smith" --base jimsnet --client abc --vendor vendor1 --ttl 720h
//! pki-lifecycle search john --base jimsnet --client abc --vendor vendor1
//! ```
//!
//! Configuration is read from `pki-lifecycle.toml` (or `--config`); missing
//! files fall back to built-in defaults. Log verbosity follows `RUST_LOG`.
//!
//! Irreversible commands (`revoke`, `cleanup-expired`) ask for a typed "yes"
//! unless `--yes` is given.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use secrecy::SecretString;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use pki_lifecycle::configs::{AppConfig, BackendKind, DEFAULT_CONFIG_PATH};
use pki_lifecycle::credentials::{CredentialManager, PersistWarning};
use pki_lifecycle::crypto::{CryptoProvider, OpensslProvider};
use pki_lifecycle::hierarchy::{compute_child_ttl, HierarchyRegistry, Namespace, Tier, Ttl};
use pki_lifecycle::issuance::{IssuanceEngine, IssuanceOutcome};
use pki_lifecycle::key_material::PasswordEntry;
use pki_lifecycle::ledger::{CertificateLedger, CertificateRecord, RecordReport};
use pki_lifecycle::memory_backend::MemoryBackend;
use pki_lifecycle::requests::{Request, SubjectFields};
use pki_lifecycle::revocation::{Confirmation, CrlOutcome, RevocationManager};
use pki_lifecycle::storage::{ArtifactStore, CredentialScope};
use pki_lifecycle::vault_backend::VaultBackend;
use pki_lifecycle::SigningBackend;

#[derive(Parser)]
#[command(name = "pki-lifecycle")]
#[command(about = "Multi-tier Certificate Authority lifecycle manager", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct NamespaceArgs {
    /// Base name (defaults to [defaults].base)
    #[arg(long)]
    base: Option<String>,

    /// Client name (defaults to [defaults].client)
    #[arg(long)]
    client: Option<String>,

    /// Vendor name (defaults to [defaults].vendor)
    #[arg(long)]
    vendor: Option<String>,

    /// Address the Root CA namespace instead of the intermediate
    #[arg(long)]
    root: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a Root CA namespace
    InitRoot {
        #[command(flatten)]
        namespace: NamespaceArgs,

        /// Root lifetime, e.g. 87600h
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Ttl>,
    },

    /// Create an Intermediate CA signed by the namespace's Root CA
    InitIntermediate {
        #[command(flatten)]
        namespace: NamespaceArgs,

        /// Intermediate lifetime (defaults to half the root TTL)
        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Ttl>,
    },

    /// Issue a leaf certificate and store it under the user directory
    Issue {
        /// Subject common name
        common_name: String,

        #[command(flatten)]
        namespace: NamespaceArgs,

        #[arg(long, value_parser = parse_ttl)]
        ttl: Option<Ttl>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        organization: Option<String>,

        #[arg(long)]
        organizational_unit: Option<String>,

        /// Two-letter country code
        #[arg(long)]
        country: Option<String>,

        /// Store the private key unencrypted without prompting
        #[arg(long)]
        no_password: bool,
    },

    /// List certificates issued by a CA namespace
    List {
        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Show one certificate record
    Show {
        serial: String,

        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Case-insensitive search on subject common names
    Search {
        pattern: String,

        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Revoke a certificate by serial number
    Revoke {
        serial: String,

        #[command(flatten)]
        namespace: NamespaceArgs,

        /// Skip the interactive confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Revoke every expired certificate that is not yet revoked
    CleanupExpired {
        #[command(flatten)]
        namespace: NamespaceArgs,

        #[arg(long)]
        yes: bool,
    },

    /// Rotate and print the CRL
    Crl {
        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Package a stored credential as a PKCS#12 bundle
    ExportP12 {
        common_name: String,

        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Count Active / Expired / Revoked certificates
    Summary {
        #[command(flatten)]
        namespace: NamespaceArgs,
    },

    /// Execute a JSON request file (CreateRoot, CreateIntermediate, IssueLeaf)
    Apply {
        file: PathBuf,

        /// Credential directory for issued leaves
        #[command(flatten)]
        namespace: NamespaceArgs,
    },
}

fn parse_ttl(s: &str) -> std::result::Result<Ttl, String> {
    s.parse::<Ttl>().map_err(|e| e.to_string())
}

struct App {
    config: AppConfig,
    backend: Arc<dyn SigningBackend>,
    crypto: Arc<dyn CryptoProvider>,
    registry: HierarchyRegistry,
    store: ArtifactStore,
}

impl App {
    fn new(config: AppConfig) -> Result<Self> {
        let backend: Arc<dyn SigningBackend> = match config.backend.kind {
            BackendKind::Vault => Arc::new(
                VaultBackend::from_config(&config.backend)
                    .context("Failed to initialize Vault backend")?,
            ),
            BackendKind::Memory => {
                warn!("Using the in-memory backend; all CA state is discarded on exit");
                Arc::new(MemoryBackend::new())
            }
        };
        Ok(Self {
            registry: HierarchyRegistry::from_config(&config),
            store: ArtifactStore::new(config.layout.clone()),
            crypto: Arc::new(OpensslProvider::new()),
            backend,
            config,
        })
    }

    fn namespace(&self, args: &NamespaceArgs) -> Namespace {
        self.config.defaults.namespace(
            args.base.as_deref(),
            args.client.as_deref(),
            args.vendor.as_deref(),
        )
    }

    fn target_path(&self, args: &NamespaceArgs) -> Result<String> {
        let namespace = self.namespace(args);
        let path = if args.root {
            self.registry
                .resolve_path(Tier::Root, &namespace.base, &namespace.client, None)?
        } else {
            self.registry.resolve(Tier::Intermediate, &namespace)?
        };
        Ok(path)
    }

    fn engine(&self) -> IssuanceEngine {
        IssuanceEngine::new(
            Arc::clone(&self.backend),
            Arc::clone(&self.crypto),
            self.registry.clone(),
        )
    }

    fn ledger(&self, args: &NamespaceArgs) -> CertificateLedger {
        CertificateLedger::new(Arc::clone(&self.backend), Arc::clone(&self.crypto)).with_artifacts(
            self.store.clone(),
            CredentialScope::from_namespace(&self.namespace(args)),
        )
    }

    fn credentials(&self) -> CredentialManager {
        CredentialManager::new(self.store.clone(), Arc::clone(&self.crypto))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let app = App::new(config)?;

    match cli.command {
        Commands::InitRoot { namespace, ttl } => init_root(&app, &namespace, ttl),
        Commands::InitIntermediate { namespace, ttl } => init_intermediate(&app, &namespace, ttl),
        Commands::Issue {
            common_name,
            namespace,
            ttl,
            email,
            organization,
            organizational_unit,
            country,
            no_password,
        } => {
            let subject = SubjectFields {
                common_name,
                organization,
                organizational_unit,
                email,
                country,
                ..SubjectFields::default()
            };
            issue(&app, &namespace, subject, ttl, no_password)
        }
        Commands::List { namespace } => {
            let path = app.target_path(&namespace)?;
            let report = app
                .ledger(&namespace)
                .records(&path)
                .context("Failed to list certificates")?;
            print_report(&path, &report);
            Ok(())
        }
        Commands::Show { serial, namespace } => {
            let path = app.target_path(&namespace)?;
            let record = app
                .ledger(&namespace)
                .get_record(&path, &serial)
                .context("Failed to read certificate")?;
            print_record_details(&record);
            Ok(())
        }
        Commands::Search { pattern, namespace } => {
            let path = app.target_path(&namespace)?;
            let report = app
                .ledger(&namespace)
                .search(&path, &pattern)
                .context("Search failed")?;
            print_report(&path, &report);
            Ok(())
        }
        Commands::Revoke {
            serial,
            namespace,
            yes,
        } => {
            let path = app.target_path(&namespace)?;
            let confirmation = confirm(yes, &format!("Revoke {} in {}?", serial, path))?;
            let manager = RevocationManager::new(Arc::clone(&app.backend), app.ledger(&namespace));
            let result = manager.revoke(&path, &serial, confirmation)?;
            if result.already_revoked {
                println!("✓ {} was already revoked at {}", serial, result.revocation_time.to_rfc3339());
            } else {
                println!("✓ Revoked {} at {}", serial, result.revocation_time.to_rfc3339());
            }
            Ok(())
        }
        Commands::CleanupExpired { namespace, yes } => {
            let path = app.target_path(&namespace)?;
            let confirmation = confirm(yes, &format!("Revoke every expired certificate in {}?", path))?;
            let manager = RevocationManager::new(Arc::clone(&app.backend), app.ledger(&namespace));
            let report = manager.cleanup_expired(&path, Utc::now(), confirmation)?;
            println!("✓ Revoked: {}", report.revoked_count());
            println!("  Already revoked: {}", report.skipped_count());
            println!("  Still active: {}", report.active);
            for failure in &report.failures {
                println!("✗ {}: {}", failure.serial_number, failure.reason);
            }
            report.into_result(&path)?;
            Ok(())
        }
        Commands::Crl { namespace } => {
            let path = app.target_path(&namespace)?;
            let manager = RevocationManager::new(Arc::clone(&app.backend), app.ledger(&namespace));
            match manager.regenerate_crl(&path)? {
                CrlOutcome::Published(snapshot) => {
                    println!("✓ CRL for {} ({} entries)", path, snapshot.entries.len());
                    for entry in &snapshot.entries {
                        println!("  {}  {}", entry.serial_number, entry.revocation_time.to_rfc3339());
                    }
                }
                CrlOutcome::Unavailable { reason, .. } => {
                    println!("✗ No CRL available for {}: {}", path, reason);
                }
            }
            Ok(())
        }
        Commands::ExportP12 {
            common_name,
            namespace,
        } => export_p12(&app, &namespace, &common_name),
        Commands::Summary { namespace } => {
            let path = app.target_path(&namespace)?;
            let summary = app.ledger(&namespace).summary(&path, Utc::now())?;
            println!("=== Certificates in {} ===", path);
            println!("  Total:      {}", summary.total);
            println!("  Active:     {}", summary.active);
            println!("  Expired:    {}", summary.expired);
            println!("  Revoked:    {}", summary.revoked);
            println!("  Unreadable: {}", summary.unreadable);
            Ok(())
        }
        Commands::Apply { file, namespace } => apply(&app, &file, &namespace),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::load().context("Failed to load default config")
        }
        None => Ok(AppConfig::default()),
    }
}

fn init_root(app: &App, args: &NamespaceArgs, ttl: Option<Ttl>) -> Result<()> {
    let mut namespace = app.namespace(args);
    namespace.vendor = None;
    let ttl = ttl.unwrap_or(app.config.defaults.root_ttl);

    let created = app
        .engine()
        .create_root_ca(&namespace, ttl, app.config.defaults.key_spec())
        .context("Failed to create Root CA")?;
    let cert_path = app
        .store
        .write_root_certificate(&namespace, &created.certificate_pem)?;

    println!("✓ Root CA created at {}", created.node.path);
    println!("  Child signing role: {} (max TTL {})",
        created.node.signing_role.role_id, created.node.signing_role.policy.max_ttl);
    println!("  Certificate: {}", cert_path.display());
    Ok(())
}

fn init_intermediate(app: &App, args: &NamespaceArgs, ttl: Option<Ttl>) -> Result<()> {
    let namespace = app.namespace(args);
    let parent_path = app
        .registry
        .resolve_path(Tier::Root, &namespace.base, &namespace.client, None)?;
    let ttl = match ttl.or(app.config.defaults.intermediate_ttl) {
        Some(ttl) => ttl,
        None => compute_child_ttl(&app.config.defaults.root_ttl)?,
    };

    let created = app
        .engine()
        .create_intermediate_ca(&parent_path, &namespace, ttl, app.config.defaults.key_spec())
        .context("Failed to create Intermediate CA")?;
    let cert_path = app
        .store
        .write_intermediate_certificate(&namespace, &created.certificate_pem)?;

    println!("✓ Intermediate CA created at {}", created.node.path);
    println!("  Signed by: {}", parent_path);
    println!("  Leaf role: {} (max TTL {})",
        created.node.signing_role.role_id, created.node.signing_role.policy.max_ttl);
    println!("  Certificate: {}", cert_path.display());
    Ok(())
}

fn issue(
    app: &App,
    args: &NamespaceArgs,
    subject: SubjectFields,
    ttl: Option<Ttl>,
    no_password: bool,
) -> Result<()> {
    let namespace = app.namespace(args);
    let issuer_path = app.registry.resolve(Tier::Intermediate, &namespace)?;
    let ttl = ttl.unwrap_or(app.config.defaults.leaf_ttl);

    let leaf = app
        .engine()
        .issue_leaf_certificate(&issuer_path, app.registry.leaf_role(), &subject, ttl)
        .context("Failed to issue certificate")?;

    let password = if no_password {
        None
    } else {
        let password = rpassword::prompt_password("Key password (empty for none): ")
            .context("Failed to read password")?;
        let confirmation = if password.is_empty() {
            String::new()
        } else {
            rpassword::prompt_password("Confirm key password: ")
                .context("Failed to read password confirmation")?
        };
        Some(PasswordEntry::new(password, confirmation))
    };

    let outcome = app.credentials().persist_credential(
        &CredentialScope::from_namespace(&namespace),
        &subject.common_name,
        &leaf.certificate_pem,
        &leaf.private_key,
        password.as_ref(),
    )?;

    println!("✓ Issued {} (serial {})", leaf.record.subject_common_name, leaf.record.serial_number);
    println!("  Valid: {} → {}", leaf.record.not_before.to_rfc3339(), leaf.record.not_after.to_rfc3339());
    if leaf.was_clamped() {
        println!("  Requested TTL {} was shortened by the issuing policy", ttl);
    }
    println!("  Certificate: {}", outcome.certificate_path.display());
    println!("  Private key: {} ({:?})", outcome.key_path.display(), outcome.key_encoding);
    if let Some(PersistWarning::PasswordMismatch { common_name }) = outcome.warning {
        println!("✗ Password confirmation did not match; key for {} is stored UNENCRYPTED", common_name);
    }
    Ok(())
}

fn export_p12(app: &App, args: &NamespaceArgs, common_name: &str) -> Result<()> {
    let namespace = app.namespace(args);
    let scope = CredentialScope::from_namespace(&namespace);
    let manager = app.credentials();

    let key_password = if manager.store().has_encrypted_key(&scope, common_name) {
        Some(SecretString::from(
            rpassword::prompt_password("Private key password: ")
                .context("Failed to read key password")?,
        ))
    } else {
        None
    };
    let bundle_password = PasswordEntry::new(
        rpassword::prompt_password("PKCS#12 password: ").context("Failed to read password")?,
        rpassword::prompt_password("Confirm PKCS#12 password: ")
            .context("Failed to read password confirmation")?,
    );

    let outcome = manager.export_pkcs12(
        &scope,
        common_name,
        &bundle_password,
        key_password.as_ref(),
        Some(&namespace),
    )?;
    println!("✓ Exported {} to {}", common_name, outcome.path.display());
    println!("  CA certificates included: {}", outcome.chain_length);
    Ok(())
}

fn apply(app: &App, file: &Path, args: &NamespaceArgs) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read request file {}", file.display()))?;
    let request = Request::from_json(&json)?;
    match app.engine().handle(&request)? {
        IssuanceOutcome::Ca(created) => {
            println!("✓ {} CA created at {}", created.node.tier, created.node.path);
        }
        IssuanceOutcome::Leaf(leaf) => {
            // Request files carry no password, so the key is stored unencrypted
            let outcome = app.credentials().persist_credential(
                &CredentialScope::from_namespace(&app.namespace(args)),
                &leaf.record.subject_common_name,
                &leaf.certificate_pem,
                &leaf.private_key,
                None,
            )?;
            println!("✓ Issued serial {}", leaf.record.serial_number);
            println!("  Certificate: {}", outcome.certificate_path.display());
            println!("✗ Private key stored UNENCRYPTED at {}", outcome.key_path.display());
            warn!(path = %outcome.key_path.display(), "Private key from request file stored unencrypted");
        }
    }
    Ok(())
}

fn confirm(yes: bool, prompt: &str) -> Result<Confirmation> {
    if yes {
        return Ok(Confirmation::Confirmed);
    }
    print!("{} Type 'yes' to continue: ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .map_err(|e| anyhow!("Failed to read confirmation: {}", e))?;
    Ok(Confirmation::from_bool(answer.trim() == "yes"))
}

fn print_report(path: &str, report: &RecordReport) {
    let now = Utc::now();
    println!("=== {} ({} certificates) ===", path, report.records.len());
    for record in &report.records {
        println!(
            "{:<48} {:<32} {:<8} {}",
            record.serial_number,
            record.subject_common_name,
            record.status(now),
            record.not_after.format("%Y-%m-%d %H:%M"),
        );
    }
    for failure in &report.failures {
        println!("✗ {}: {}", failure.serial_number, failure.reason);
    }
}

fn print_record_details(record: &CertificateRecord) {
    println!("Serial:        {}", record.serial_number);
    println!("Common Name:   {}", record.subject_common_name);
    println!("Issuer Path:   {}", record.issuer_path);
    println!("Not Before:    {}", record.not_before.to_rfc3339());
    println!("Not After:     {}", record.not_after.to_rfc3339());
    println!("Status:        {}", record.status(Utc::now()));
    if let Some(revoked) = record.revocation_time {
        println!("Revoked At:    {}", revoked.to_rfc3339());
    }
    println!("Key Usage:     {:?}", record.key_usage);
    println!("Encrypted Key: {}", record.has_encrypted_key);
}
