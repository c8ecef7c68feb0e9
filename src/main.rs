mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use clipforge::ffmpeg::probe as av_probe;
use clipforge::{config, ffmpeg, server};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise derive defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,tower_http=debug".to_string()
        } else {
            "clipforge=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json))
        }
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(host: String, port: u16, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // CLI host/port override the config file.
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting clipforge");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );
    tracing::info!("Artifact root: {:?}", config.storage.root_dir);
    tracing::info!("Renderer: {}", config.renderer.base_url);

    server::start_server(config).await
}

async fn probe_file(file: &std::path::Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let info = av_probe::probe_file(file, std::time::Duration::from_secs(30)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("File: {}", file.display());
        println!("Container: {}", info.container);
        println!("Size: {} bytes", info.size_bytes);
        if let Some(duration) = info.duration_secs {
            let secs = duration as u64;
            let mins = secs / 60;
            let hours = mins / 60;
            println!("Duration: {:02}:{:02}:{:02}", hours, mins % 60, secs % 60);
        }

        println!("\nVideo Streams: {}", info.video_streams.len());
        for (i, stream) in info.video_streams.iter().enumerate() {
            print!("  [{}] {} {}x{}", i, stream.codec, stream.width, stream.height);
            if let Some(fps) = stream.frame_rate {
                print!(" {:.3} fps", fps);
            }
            println!();
        }

        println!("\nAudio Streams: {}", info.audio_streams.len());
        for (i, stream) in info.audio_streams.iter().enumerate() {
            print!("  [{}] {} {}ch", i, stream.codec, stream.channels);
            if let Some(rate) = stream.sample_rate {
                print!(" {} Hz", rate);
            }
            println!();
        }

        println!("\nSubtitle Streams: {}", info.subtitle_streams);
    }

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = ffmpeg::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable all features.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Artifact root: {:?}", config.storage.root_dir);
            println!("  Retention: {}s", config.storage.retention_secs);
            println!("  Renderer: {}", config.renderer.base_url);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Artifact root: {:?}", config.storage.root_dir);
        }
    }

    Ok(())
}
