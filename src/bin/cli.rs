use anyhow::Context;
use relaycam::audio::list_output_devices;
use relaycam::status::{run_observer, LogObserver, StatusNotifier};
use relaycam::{RelayConfig, RelayServer};
use std::env;
use std::path::PathBuf;

const USAGE: &str = "Usage: relaycam <command> [args]
       relaycam --version

Commands:
  serve [--config <path>]          Run the relay until Ctrl-C
  url [--config <path>]            Print the address to open on the headset
  list-audio-outputs [--json]      List audio output devices
  init-config [<path>]             Write the default configuration";

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "serve" => cmd_serve(&args),
        "url" => cmd_url(&args),
        "list-audio-outputs" => cmd_list_audio_outputs(&args),
        "init-config" => cmd_init_config(&args),
        "-h" | "--help" | "help" => {
            println!("{}\n\n{}", relaycam::DESCRIPTION, USAGE);
            Ok(())
        }
        "-V" | "--version" => {
            println!("{} {}", relaycam::NAME, relaycam::VERSION);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

fn config_path(args: &[String]) -> anyhow::Result<Option<PathBuf>> {
    let mut i = 2;
    while i < args.len() {
        if args[i] == "--config" {
            let path = args.get(i + 1).context("--config needs a path")?;
            return Ok(Some(PathBuf::from(path)));
        }
        i += 1;
    }
    Ok(None)
}

fn load_config(args: &[String]) -> anyhow::Result<RelayConfig> {
    let config = match config_path(args)? {
        Some(path) => RelayConfig::load_from_file(&path)?,
        None => RelayConfig::load_or_default(),
    };
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    Ok(config)
}

fn cmd_serve(args: &[String]) -> anyhow::Result<()> {
    relaycam::init_logging();
    let config = load_config(args)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let result = runtime.block_on(async move {
        let (notifier, events) = StatusNotifier::channel();
        let observer = tokio::spawn(run_observer(events, LogObserver));
        let result = RelayServer::new(config, notifier).run().await;
        let _ = observer.await;
        result
    });

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_url(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    println!("{}", config.advertised_url());
    Ok(())
}

fn cmd_list_audio_outputs(args: &[String]) -> anyhow::Result<()> {
    let devices = list_output_devices()?;
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            let marker = if d.is_default { " (default)" } else { "" };
            println!("{}: {} [{} Hz, {} ch]{}", d.id, d.name, d.sample_rate, d.channels, marker);
        }
    }
    Ok(())
}

fn cmd_init_config(args: &[String]) -> anyhow::Result<()> {
    let path = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(RelayConfig::default_path);
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    RelayConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
