//! CLI entry point for `mailupload`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, DECIMAL};

use mailupload::config::{self, Config};
use mailupload::{HttpTransport, MailComposer, MailUploader, UploadOptions};

#[derive(Parser)]
#[command(
    name = "mailupload",
    version,
    about = "Convert an email message into a multipart/form-data upload"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a message and POST it to a URL
    Upload {
        /// Message file (.eml, or a single mbox-exported message)
        file: PathBuf,
        /// Target endpoint
        url: String,
        /// Extra form field sent ahead of the message fields (repeatable)
        #[arg(short = 'F', long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        /// Directory for temporary files
        #[arg(long, env = "MAILUPLOAD_TEMP_DIR")]
        temp_dir: Option<PathBuf>,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Convert a message and write the multipart body to a file
    Compose {
        /// Message file
        file: PathBuf,
        /// Output file for the multipart body
        #[arg(short, long)]
        output: PathBuf,
        /// Extra form field sent ahead of the message fields (repeatable)
        #[arg(short = 'F', long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        /// Directory for temporary files
        #[arg(long, env = "MAILUPLOAD_TEMP_DIR")]
        temp_dir: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Upload {
            file,
            url,
            fields,
            temp_dir,
            timeout,
            json,
        } => {
            let options = build_options(&config, &fields, temp_dir)?;
            let timeout = timeout.map(Duration::from_secs).or(config.upload.timeout());
            cmd_upload(&file, &url, options, timeout, json).await
        }
        Commands::Compose {
            file,
            output,
            fields,
            temp_dir,
        } => {
            let options = build_options(&config, &fields, temp_dir)?;
            cmd_compose(&file, &output, options).await
        }
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailupload.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Merge config file settings with command-line overrides.
fn build_options(
    config: &Config,
    fields: &[String],
    temp_dir: Option<PathBuf>,
) -> anyhow::Result<UploadOptions> {
    let mut options = UploadOptions::from_config(config);
    if let Some(dir) = temp_dir {
        options = options.with_temp_dir(dir);
    }
    for pair in fields {
        let (name, value) = config::parse_field(pair)?;
        options = options.with_field(name, value);
    }
    Ok(options)
}

/// Convert and upload a message, printing the response.
async fn cmd_upload(
    file: &Path,
    url: &str,
    options: UploadOptions,
    timeout: Option<Duration>,
    json: bool,
) -> anyhow::Result<()> {
    let transport = HttpTransport::new(timeout)?;
    let uploader = MailUploader::new(options, transport);
    let response = uploader.upload_file(file, url).await?;

    if json {
        let mut output = serde_json::to_value(&response)?;
        output["body"] = serde_json::Value::String(response.body_text().into_owned());
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "HTTP {} ({} response)",
            response.status,
            format_size(response.body.len() as u64, DECIMAL)
        );
        let body = response.body_text();
        if !body.trim().is_empty() {
            println!("{}", body.trim_end());
        }
    }

    if !response.is_success() {
        anyhow::bail!("server answered with status {}", response.status);
    }
    Ok(())
}

/// Convert a message into a multipart body on disk.
async fn cmd_compose(file: &Path, output: &Path, options: UploadOptions) -> anyhow::Result<()> {
    let composer = MailComposer::new(options);
    let composed = composer.compose_file(file, output).await?;

    println!(
        "Wrote {} ({} attachment(s)) to {}",
        format_size(composed.length, DECIMAL),
        composed.attachments,
        output.display()
    );
    println!("Content-Type: {}", composed.boundary.content_type());
    println!("Content-Length: {}", composed.length);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailupload", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
