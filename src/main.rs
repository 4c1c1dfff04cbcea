use clap::{Parser, Subcommand};
use std::future::Future;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

use nasa_apod::config::secs_to_duration;
use nasa_apod::logger::{init_logger, DEFAULT_DIRECTIVE, QUIET_DIRECTIVE};
use nasa_apod::prelude::*;
use nasa_apod::utils::{parse_date_arg, Clock, SystemClock};

const DEMO_KEY_NOTICE: &str = "You are using the demo API Key DEMO_KEY. \
    Apply for an API key at https://api.nasa.gov/index.html#apply-for-an-api-key";

#[derive(Parser)]
#[command(name = "nasa", version)]
#[command(about = "NASA Astronomy Picture of the Day and Near Earth Objects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the Astronomy Picture of the Day (default)
    Apod {
        /// APOD on a particular date, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
    },
    /// Print near earth objects by closest approach date
    Neo {
        /// Start date, YYYY-MM-DD (default: today)
        #[arg(long)]
        start: Option<String>,
        /// End date, YYYY-MM-DD (default: the start date)
        #[arg(long)]
        end: Option<String>,
    },
    /// Serve today's and random APODs over HTTP
    Web {
        /// Listening address, e.g. 127.0.0.1:8080 or :8080
        #[arg(long)]
        listen: Option<String>,
    },
    /// Periodically set the desktop wallpaper to an APOD
    Wallpaper {
        /// Seconds between wallpaper changes (minimum 1)
        #[arg(long)]
        interval: Option<f64>,
        /// Command used to set the wallpaper, %s is replaced by the image path
        #[arg(long)]
        cmd: Option<String>,
        /// Use a built-in command: gnome, kde, gnome2, xfce, mate, lxde, feh, setroot
        #[arg(long = "cmd-default")]
        cmd_default: Option<String>,
        /// Only display today's APOD instead of random ones
        #[arg(long)]
        today: bool,
        /// Stop after this many updates
        #[arg(long)]
        iterations: Option<u64>,
    },
}

impl Command {
    fn is_long_running(&self) -> bool {
        matches!(self, Command::Web { .. } | Command::Wallpaper { .. })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Apod { date: None });
    init_logger(if command.is_long_running() {
        DEFAULT_DIRECTIVE
    } else {
        QUIET_DIRECTIVE
    });

    if let Err(e) = run(command).await {
        eprintln!("nasa: {}", e);
        process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::load()?;
    if config.using_demo_key() {
        eprintln!("{}", DEMO_KEY_NOTICE);
    }

    let http: Arc<dyn HttpClient> = Arc::new(HyperClient::new(config.api.timeout()));
    let client = Arc::new(ApodClient::new(http.clone(), &config.api, Arc::new(TodayCache::new())));

    match command {
        Command::Apod { date } => {
            let image = match date {
                Some(date) => client.fetch(parse_date_arg(&date)?).await?,
                None => client.today().await?,
            };
            println!("{}", image);
        }
        Command::Neo { start, end } => {
            let start = match start {
                Some(s) => parse_date_arg(&s)?,
                None => SystemClock.today(),
            };
            let end = match end {
                Some(e) => parse_date_arg(&e)?,
                None => start,
            };
            let list = NeoClient::new(http, &config.api).feed(start, end).await?;
            println!("{}", list);
        }
        Command::Web { listen } => {
            let addr = match listen {
                Some(listen) => parse_listen(&listen)?,
                None => config.server.addr()?,
            };
            let sampler = Arc::new(RandomSampler::new(client.clone()));
            let state = Arc::new(AppState::new(client, sampler, config.server.random_refresh())?);
            ApodServer::new(addr, state).run(shutdown_signal()).await?;
            info!("Server stopped");
        }
        Command::Wallpaper {
            interval,
            cmd,
            cmd_default,
            today,
            iterations,
        } => {
            let interval = match interval {
                Some(secs) => secs_to_duration(secs)?,
                None => config.wallpaper.interval()?,
            };
            let setter = select_setter(
                cmd.as_deref(),
                cmd_default.as_deref(),
                config.wallpaper.command.as_deref(),
            )?;
            let downloads: Arc<dyn HttpClient> =
                Arc::new(HyperClient::new(config.wallpaper.download_timeout()));
            let sink = Arc::new(WallpaperSink::new(downloads, setter)?);

            let source: Arc<dyn ImageSource> = if today {
                Arc::new(TodaySource::new(client))
            } else {
                Arc::new(RandomSampler::new(client))
            };

            let mut update = UpdateConfig::new(interval);
            if let Some(n) = iterations {
                update = update.with_iterations(n);
            }
            let report = UpdateLoop::new(source, sink, update)
                .run(shutdown_signal())
                .await?;
            info!("Wallpaper updates: {} ok, {} failed", report.successes, report.failures);
        }
    }
    Ok(())
}

/// Accepts `host:port` or a bare `:port`, which listens on all interfaces.
fn parse_listen(listen: &str) -> Result<SocketAddr> {
    let listen = if listen.starts_with(':') {
        format!("0.0.0.0{}", listen)
    } else {
        listen.to_string()
    };
    listen
        .parse()
        .map_err(|e| NasaError::ConfigInvalid(format!("invalid listen address {:?}: {}", listen, e)))
}

/// Installs the signal handlers immediately, so a signal that arrives before
/// the returned future is first polled still triggers a graceful shutdown.
fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let handlers = signal(SignalKind::interrupt()).and_then(|interrupt| {
            signal(SignalKind::terminate()).map(|terminate| (interrupt, terminate))
        });
        async move {
            match handlers {
                Ok((mut interrupt, mut terminate)) => {
                    tokio::select! {
                        _ = interrupt.recv() => info!("Received Ctrl+C signal"),
                        _ = terminate.recv() => info!("Received terminate signal"),
                    }
                }
                Err(e) => {
                    error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let ctrl_c = tokio::spawn(tokio::signal::ctrl_c());
        async move {
            match ctrl_c.await {
                Ok(Ok(())) => info!("Received Ctrl+C signal"),
                Ok(Err(e)) => {
                    error!("Failed to install Ctrl+C handler: {}", e);
                    std::future::pending::<()>().await;
                }
                Err(e) => {
                    error!("Ctrl+C listener stopped: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
