//! AutoGLM Client - drive a remote AutoGLM phone agent from the terminal
//!
//! Run with: cargo run --bin autoglm-client -- [health | devices | stop | run <task> | <task>]

use std::env;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::{bail, Context};
use autoglm_client::{
    ClientEvent, ClientSettings, DeviceAddress, ExecutionClient, TaskOutcome,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();

    // Saved settings first, then environment overrides
    let mut settings = ClientSettings::load();
    if let Ok(url) = env::var("AUTOGLM_SERVER_URL") {
        settings.server_url = url;
    }
    if let Ok(device) = env::var("AUTOGLM_DEVICE_ID") {
        settings.device_id = device;
    }
    if let Some(ms) = env::var("AUTOGLM_POLL_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        settings.poll_interval_ms = ms;
    }
    if let Some(secs) = env::var("AUTOGLM_SUBMIT_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        settings.submit_timeout_secs = secs;
    }

    // --device <addr> overrides everything else
    if let Some(pos) = args.iter().position(|arg| arg == "--device") {
        if pos + 1 >= args.len() {
            bail!("--device requires an address such as 192.168.1.100:5555");
        }
        settings.device_id = args.remove(pos + 1);
        args.remove(pos);
    }
    let save_settings = if let Some(pos) = args.iter().position(|arg| arg == "--save") {
        args.remove(pos);
        true
    } else {
        false
    };

    let device = settings
        .device()
        .transpose()
        .context("Invalid device address")?;

    if save_settings {
        settings.save().context("Failed to save settings")?;
        if let Some(path) = ClientSettings::settings_path() {
            println!("💾 Settings saved to {}", path.display());
        }
    }

    let client = ExecutionClient::start(settings.client_config())?;

    let result = match args.first().map(String::as_str) {
        Some("health") => print_health(&client).await,
        Some("devices") => print_devices(&client).await,
        Some("stop") => {
            // Stop is a no-op for an idle client, so hit the server directly.
            client.check_health().await?;
            stop_remote(&settings).await
        }
        Some("run") => run_task(&client, &args[1..].join(" "), device.as_ref()).await,
        Some(_) => run_task(&client, &args.join(" "), device.as_ref()).await,
        None => interactive(&client, &settings, device.as_ref()).await,
    };

    client.shutdown().await;
    result
}

/// Print server health.
async fn print_health(client: &ExecutionClient) -> anyhow::Result<()> {
    let health = client.check_health().await?;
    let state = client.state();

    println!(
        "{} Server: {}",
        if state.is_connected { "🟢" } else { "🔴" },
        health.status
    );
    println!("Agent initialized: {}", health.agent_initialized);
    println!("Devices: {}", health.devices.len());
    Ok(())
}

/// Print devices known to the server.
async fn print_devices(client: &ExecutionClient) -> anyhow::Result<()> {
    let devices = client.list_devices().await?;
    if devices.is_empty() {
        println!("No devices connected");
    }
    for device in devices {
        println!(
            "📱 {} [{}] {} {}",
            device.id,
            device.connection_type,
            device.status,
            device.model.unwrap_or_default()
        );
    }
    Ok(())
}

/// Ask the server to stop whatever it is running.
async fn stop_remote(settings: &ClientSettings) -> anyhow::Result<()> {
    let transport = autoglm_client::HttpTransport::new(&settings.server_url)?;
    transport
        .post_ignoring_body(
            autoglm_client::api::STOP_PATH,
            Duration::from_secs(settings.request_timeout_secs),
        )
        .await?;
    println!("⏹️  Stop requested");
    Ok(())
}

/// Submit a task and follow it until it ends. Ctrl-C stops it.
async fn run_task(
    client: &ExecutionClient,
    task: &str,
    device: Option<&DeviceAddress>,
) -> anyhow::Result<()> {
    let task = task.trim();
    if task.is_empty() {
        bail!("No task given");
    }

    let health = client.check_health().await?;
    if !health.is_ok() {
        bail!("AutoGLM server is not ready (status: {})", health.status);
    }

    println!("📝 Task: {}", task);
    if let Some(device) = device {
        println!("Device: {}", device);
    }

    let printer = spawn_step_printer(client.events());
    let ack = client
        .execute_task(task, device.map(DeviceAddress::to_string))
        .await?;
    println!("ℹ️  {}", ack);

    let outcome = tokio::select! {
        outcome = client.wait_for_completion() => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!("\n⏹️  Stopping...");
            client.stop_task().await?;
            Some(TaskOutcome::Stopped)
        }
    };
    printer.abort();

    match outcome {
        Some(TaskOutcome::Completed { message }) => println!("\n✅ Result: {}", message),
        Some(TaskOutcome::Finished) => println!("\n✅ Task completed successfully!"),
        Some(TaskOutcome::Stopped) => println!("\n⏹️  Task stopped by user"),
        Some(TaskOutcome::Failed { error }) => eprintln!("\n❌ Error: {}", error),
        None => eprintln!("\n❌ Client stopped before the task finished"),
    }
    Ok(())
}

/// Print steps as they arrive.
fn spawn_step_printer(
    mut events: tokio::sync::broadcast::Receiver<ClientEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut printed = 0;
        loop {
            match events.recv().await {
                Ok(ClientEvent::TaskSubmitted { .. }) => printed = 0,
                Ok(ClientEvent::StepsUpdated { steps }) => {
                    for step in steps.iter().skip(printed) {
                        println!("💭 Step {}: {}", step.step_number, step.thinking);
                        if let Some(action) = &step.action {
                            println!("🎯 Action: {}", action);
                        }
                    }
                    printed = printed.max(steps.len());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Step printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Read tasks from stdin until `quit`.
async fn interactive(
    client: &ExecutionClient,
    settings: &ClientSettings,
    device: Option<&DeviceAddress>,
) -> anyhow::Result<()> {
    println!("🤖 AutoGLM Client");
    println!("================================================");
    println!("Server: {}", settings.server_url);
    if let Some(device) = device {
        println!("Device: {}", device);
    }
    println!("================================================\n");

    if let Err(e) = print_health(client).await {
        eprintln!("❌ {}", e);
    }

    println!("\nInteractive mode. Type your task and press Enter.");
    println!("Type 'quit' or 'exit' to exit.\n");

    let stdin = io::stdin();
    loop {
        print!("📝 Task: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let task = line.trim();

        if task.is_empty() {
            continue;
        }

        if task == "quit" || task == "exit" {
            println!("Goodbye! 👋");
            break;
        }

        if let Err(e) = run_task(client, task, device).await {
            eprintln!("\n❌ Error: {}\n", e);
        }
    }

    Ok(())
}
