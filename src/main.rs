use clap::Parser;
use keylight::broadcast::{self, JsonLineSink};
use keylight::messaging::channels::NotificationConsumer;
use keylight::messaging::notification::NotificationLevel;
use keylight::timeline::loader;
use keylight::{
    Command, MidiInputManager, Settings, create_live_event_channel,
    create_notification_channel, scheduler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};

// Ring buffer capacities. MIDI tops out around a thousand messages a second,
// so 512 covers half a second of the worst burst a keyboard can produce;
// notifications are rare and 256 is plenty.
const LIVE_RINGBUFFER_CAPACITY: usize = 512;
const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 256;

/// Snapshot stream cadence for the stdout transport (the tick loop itself
/// runs at 60 Hz regardless).
const BROADCAST_INTERVAL: Duration = Duration::from_millis(33);

#[derive(Parser)]
#[command(
    name = "keylight",
    version,
    about = "Real-time MIDI timeline engine: plays a song, tracks live input, and streams learn-mode snapshots as JSON lines"
)]
struct Cli {
    /// MIDI file to play
    song: Option<PathBuf>,

    /// Settings file (RON); defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// List songs in the configured songs directory and exit
    #[arg(long)]
    list: bool,

    /// List available MIDI input ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Override the configured tempo scale (percent, > 0)
    #[arg(long)]
    tempo_scale: Option<u16>,

    /// Run without opening a live MIDI input device
    #[arg(long)]
    no_live_input: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("keylight=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => match Settings::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                error!(%err, config = %path.display(), "failed to load settings");
                std::process::exit(1);
            }
        },
        None => Settings::default(),
    };
    if let Some(scale) = cli.tempo_scale {
        settings.tempo_scale_percent = scale;
    }
    if let Err(err) = settings.validate() {
        error!(%err, "invalid settings");
        std::process::exit(1);
    }

    if cli.list_ports {
        for name in keylight::midi::input::available_ports() {
            println!("{name}");
        }
        return;
    }

    if cli.list {
        for song in loader::scan_directory(&settings.songs_dir) {
            println!("{}\t{}", song.name, song.path.display());
        }
        return;
    }

    let Some(song) = cli.song else {
        error!("no song given; try --list to see the library");
        std::process::exit(1);
    };

    // Live input path: device callback -> ring buffer -> router
    let (live_tx, live_rx) = create_live_event_channel(LIVE_RINGBUFFER_CAPACITY);
    let (midi_notification_tx, midi_notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);
    let (engine_notification_tx, engine_notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);

    let _midi_manager = if cli.no_live_input {
        info!("live input disabled");
        None
    } else {
        Some(MidiInputManager::new(live_tx, midi_notification_tx))
    };

    let handle = scheduler::spawn(song, settings, live_rx, engine_notification_tx, true);

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        let commands = handle.command_sender();
        if let Err(err) = ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
            let _ = commands.send(Command::Stop);
        }) {
            warn!(%err, "could not install Ctrl-C handler");
        }
    }

    let notification_logger = spawn_notification_logger(
        vec![midi_notification_rx, engine_notification_rx],
        stop.clone(),
    );

    // The broadcast loop owns this thread until playback stops
    let mut sink = JsonLineSink::new(std::io::stdout().lock());
    broadcast::run_broadcast_loop(handle.publisher(), &mut sink, BROADCAST_INTERVAL, stop.clone());

    stop.store(true, Ordering::Relaxed);
    handle.join();
    let _ = notification_logger.join();
}

/// Drain the notification side channels into the log until shutdown.
fn spawn_notification_logger(
    mut consumers: Vec<NotificationConsumer>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        use ringbuf::traits::Consumer;
        loop {
            let mut drained = false;
            for consumer in &mut consumers {
                while let Some(notification) = consumer.try_pop() {
                    drained = true;
                    match notification.level {
                        NotificationLevel::Info => {
                            info!(category = ?notification.category, "{}", notification.message)
                        }
                        NotificationLevel::Warning => {
                            warn!(category = ?notification.category, "{}", notification.message)
                        }
                        NotificationLevel::Error => {
                            error!(category = ?notification.category, "{}", notification.message)
                        }
                    }
                }
            }
            if stop.load(Ordering::Relaxed) && !drained {
                return;
            }
            std::thread::sleep(Duration::from_millis(200));
        }
    })
}
