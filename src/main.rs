use anyhow::{bail, Context, Result};
use chrono::Utc;
use crossterm::style::Stylize;
use std::io::{self, Write};
use std::sync::{Arc, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use draftstream::config::{self, URL_ENV_VAR};
use draftstream::export::{export_displayed, ExportFormat, HtmlFileExporter};
use draftstream::history::{HistorySink, HistoryStore};
use draftstream::render::RenderView;
use draftstream::{logging, session, stats};
use draftstream::{ClientRequest, ConnectionState, Session, SessionEvent, SharedSession, StreamClient};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init(logging::DEFAULT_DIRECTIVE);

    let config = config::load_config()?;
    let prompt = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let request = ClientRequest::generate(prompt, Some(config.target_pages))?;

    let client = StreamClient::new(config.client_config());
    let Some(url) = client.url().map(ToString::to_string) else {
        bail!(
            "No server URL configured. Set server_url in {} or {URL_ENV_VAR}",
            config::get_config_path()?.display()
        );
    };

    let history: Arc<dyn HistorySink> =
        Arc::new(HistoryStore::new().context("Failed to open history")?);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let session = Session::new(config.session_options())
        .with_events(tx)
        .with_history(history)
        .into_shared();
    let _subscription = session::attach(&session, &client);
    let mut view = lock(&session).view();

    eprintln!("{}", format!("Connecting to {url}...").dark_grey());
    client.connect();
    client
        .watch_state()
        .wait_for(|state| state.is_connected())
        .await
        .context("Connection state channel closed")?;

    if !lock(&session).submit(&client, &request) {
        bail!("Failed to send generate request");
    }

    let outcome = stream_document(&client, &mut view, &mut rx).await;

    if outcome.is_ok() {
        let document = view.displayed();
        let words = stats::word_count(&document);
        let pages = stats::estimated_pages(words);
        eprintln!(
            "\n{}",
            format!(
                "{words} words, ~{pages} pages ({:.0}% of {} requested)",
                stats::page_progress(pages, config.target_pages),
                config.target_pages
            )
            .green()
        );

        let exporter = HtmlFileExporter::new(config.export_dir());
        let filename = format!("contract-{}", Utc::now().format("%Y%m%d-%H%M%S"));
        match export_displayed(&exporter, &document, &filename, ExportFormat::Html).await {
            Ok(true) => eprintln!(
                "{}",
                format!(
                    "Saved {}",
                    exporter.path_for(&filename, ExportFormat::Html).display()
                )
                .green()
            ),
            Ok(false) => eprintln!("{}", "Export declined".yellow()),
            Err(e) => eprintln!("{}", format!("Export failed: {e}").red()),
        }
    }

    client.disconnect();
    lock(&session).shutdown();

    if let Err(message) = outcome {
        bail!(message);
    }
    Ok(())
}

/// Print the document as it is revealed until generation ends and the
/// render buffer has drained.
async fn stream_document(
    client: &StreamClient,
    view: &mut RenderView,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
) -> std::result::Result<(), String> {
    let mut stdout = io::stdout();
    let mut printed = 0;
    let mut states = client.watch_state();

    loop {
        tokio::select! {
            alive = view.changed() => {
                if !alive {
                    return Err("Renderer stopped".to_string());
                }
                print_new(view, &mut stdout, &mut printed);
            }
            event = events.recv() => match event {
                Some(SessionEvent::Started(message)) => {
                    let status = message.unwrap_or_else(|| "Generating...".to_string());
                    eprintln!("{}", status.dark_grey());
                }
                Some(SessionEvent::Completed { .. }) => break,
                Some(SessionEvent::Failed(error)) => {
                    eprintln!("\n{}", format!("Error: {error}").red().bold());
                    return Err(error);
                }
                None => return Err("Session closed".to_string()),
            },
            changed = states.changed() => {
                if changed.is_err() {
                    return Err("Connection closed".to_string());
                }
                let state = *states.borrow_and_update();
                if state == ConnectionState::Error {
                    let message = client.last_error().unwrap_or_default();
                    eprintln!("\n{}", message.yellow());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                return Err("Cancelled".to_string());
            }
        }
    }

    // Generation is over; let the typing effect catch up
    while !view.is_drained() {
        if !view.changed().await {
            break;
        }
        print_new(view, &mut stdout, &mut printed);
    }
    print_new(view, &mut stdout, &mut printed);
    Ok(())
}

fn print_new(view: &RenderView, out: &mut impl Write, printed: &mut usize) {
    let shown = view.displayed();
    if shown.len() < *printed {
        // Document was replaced; start over on a fresh line
        let _ = writeln!(out);
        *printed = 0;
    }
    if shown.len() > *printed {
        let _ = out.write_all(&shown.as_bytes()[*printed..]);
        let _ = out.flush();
        *printed = shown.len();
    }
}

fn lock(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
