use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use gphotos_api::config::default_auth_path;
use gphotos_api::provider::{
    CookieHeaderProvider, CredentialProvider, ProvidedCredentials, authenticate, login,
};
use gphotos_api::{
    ClientConfig, CookieCredentials, TokenPolicy, Upload, UploadError, UploadOptions,
    content_type_for,
};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "gphotos-uploader",
    version,
    about = "Upload photos to Google Photos with browser session cookies"
)]
struct Cli {
    /// Auth file (default: ~/.config/gphotos-uploader/auth.json)
    #[arg(long, global = true, value_name = "PATH")]
    auth: Option<PathBuf>,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload photos and videos
    Upload {
        /// Files to upload
        files: Vec<PathBuf>,
        /// Upload every supported file in directory
        #[arg(short, long, value_name = "PATH")]
        directory: Option<PathBuf>,
        /// Recursive directory traversal (with -d)
        #[arg(short, long)]
        recursive: bool,
        /// Extra attempts for network failures and 5xx responses
        #[arg(long, default_value = "2")]
        retries: u32,
        /// Scrape a fresh at-token for every file
        #[arg(long)]
        fresh_token: bool,
        /// Log in with this `Cookie:` header if the saved session is unusable
        #[arg(long, value_name = "HEADER", requires = "user_id")]
        cookie_header: Option<String>,
        /// Account id for --cookie-header
        #[arg(long, requires = "cookie_header")]
        user_id: Option<String>,
    },
    /// Save session cookies copied from a logged-in browser
    Login {
        /// Value of the browser's `Cookie:` request header
        #[arg(long, value_name = "HEADER")]
        cookie_header: String,
        /// Numeric account id
        #[arg(long)]
        user_id: String,
    },
    /// Check that the saved session is still accepted
    Check,
    /// Remove the saved session
    Logout,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let auth = match cli.auth {
        Some(path) => path,
        None => default_auth_path()?,
    };
    match cli.command {
        Command::Upload {
            files,
            directory,
            recursive,
            retries,
            fresh_token,
            cookie_header,
            user_id,
        } => {
            let fallback = cookie_header.zip(user_id).map(|(cookie_header, user_id)| {
                CookieHeaderProvider {
                    cookie_header,
                    user_id,
                }
            });
            cmd_upload(
                &auth,
                files,
                directory.as_ref(),
                recursive,
                retries,
                fresh_token,
                fallback,
            )
        }
        Command::Login {
            cookie_header,
            user_id,
        } => cmd_login(&auth, cookie_header, user_id),
        Command::Check => cmd_check(&auth),
        Command::Logout => cmd_logout(&auth),
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "gphotos_api=info",
        1 => "gphotos_api=debug",
        _ => "gphotos_api=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ── upload ──

fn cmd_upload(
    auth: &Path,
    mut files: Vec<PathBuf>,
    directory: Option<&PathBuf>,
    recursive: bool,
    retries: u32,
    fresh_token: bool,
    fallback: Option<CookieHeaderProvider>,
) -> Result<()> {
    if let Some(dir) = directory {
        files.extend(collect_media(dir, recursive)?);
    }
    if files.is_empty() {
        eprintln!("No files specified. Use --help for usage.");
        std::process::exit(1);
    }

    let config = ClientConfig {
        token_policy: if fresh_token {
            TokenPolicy::PerUpload
        } else {
            TokenPolicy::Cached
        },
        ..ClientConfig::default()
    };
    let provider = || -> gphotos_api::Result<ProvidedCredentials> {
        match &fallback {
            Some(header) => header.provide(),
            None => Err(UploadError::Auth("no cookies given".into())),
        }
    };
    let credentials = authenticate(auth, &config, &provider)
        .with_context(|| format!("cannot use session in {}; run `login` first", auth.display()))?;

    let mut failed = 0usize;
    for file in &files {
        match upload_with_retries(file, &credentials, retries) {
            Ok(url) => println!("{} -> {url}", file.display()),
            Err(e) => {
                failed += 1;
                eprintln!("error: {}: {e:#}", file.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} uploads failed", files.len());
    }
    Ok(())
}

fn collect_media(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if recursive {
        for entry in WalkDir::new(dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
        {
            if entry.file_type().is_file() && is_media(entry.path()) {
                found.push(entry.into_path());
            }
        }
    } else {
        for entry in std::fs::read_dir(dir).context("failed to read directory")? {
            let path = entry?.path();
            if path.is_file() && is_media(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

fn is_media(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| content_type_for(&n.to_string_lossy()) != "application/octet-stream")
}

fn upload_with_retries(file: &Path, credentials: &CookieCredentials, retries: u32) -> Result<String> {
    let mut attempt = 0;
    loop {
        let options = UploadOptions::from_path(file).context("failed to read file")?;
        match Upload::new(options, credentials).run() {
            Ok(image) => return Ok(image.url),
            Err(e) if attempt < retries && e.source.is_transient() => {
                attempt += 1;
                let backoff = Duration::from_secs(1 << attempt.min(5));
                tracing::warn!(file = %file.display(), attempt, error = %e, "retrying in {backoff:?}");
                thread::sleep(backoff);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

// ── login / check / logout ──

fn cmd_login(auth: &Path, cookie_header: String, user_id: String) -> Result<()> {
    let provider = CookieHeaderProvider {
        cookie_header,
        user_id,
    };
    let credentials = login(auth, &ClientConfig::default(), &provider)
        .context("cookies were not saved")?;
    println!(
        "Session for user id {} saved to {}.",
        credentials.user_id(),
        auth.display()
    );
    Ok(())
}

fn cmd_check(auth: &Path) -> Result<()> {
    let credentials = match CookieCredentials::from_file(auth, ClientConfig::default()) {
        Ok(credentials) => credentials,
        Err(e) => {
            println!("Not logged in: {e}");
            return Ok(());
        }
    };
    println!("Logged in (user id {}).", credentials.user_id());
    credentials
        .refresh_token()
        .context("session accepted but no at-token on the homepage")?;
    println!("Token scrape OK.");
    Ok(())
}

fn cmd_logout(auth: &Path) -> Result<()> {
    match std::fs::remove_file(auth) {
        Ok(()) => println!("Session cleared."),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("No saved session."),
        Err(e) => return Err(e).context("failed to remove auth file"),
    }
    Ok(())
}
