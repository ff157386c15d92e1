use std::collections::HashMap;
use std::io;
use std::io::Write;
use std::mem::discriminant;
use std::process::ExitCode;

use activity_feed_api::auth::AuthProvider;
use activity_feed_client::HttpTransport;
use activity_feed_core::ActivityItem;
use activity_feed_core::FeedPhase;
use activity_feed_core::FeedSession;
use activity_feed_core::FeedView;
use activity_feed_core::StreamStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::render::Renderer;

pub(crate) async fn run_watch<T, A>(
    session: FeedSession<T, A>,
    renderer: Renderer,
) -> anyhow::Result<ExitCode>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    let (tx, mut rx) = watch::channel(FeedView::new());
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let run = tokio::spawn(async move { session.run(tx, run_cancel).await });

    let mut printer = WatchPrinter::new(renderer);
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = rx.borrow_and_update().clone();
                printer.print(&view, &mut stdout, &mut stderr)?;
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted; closing the feed");
                cancel.cancel();
                break;
            }
        }
    }

    let result = run.await?;
    let view = rx.borrow().clone();
    printer.print(&view, &mut stdout, &mut stderr)?;

    Ok(match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(%err, "feed session ended with an error");
            ExitCode::FAILURE
        }
    })
}

/// Prints each view snapshot incrementally: a phase is printed once, and
/// once loaded only new or changed cards follow.
struct WatchPrinter {
    renderer: Renderer,
    last_phase: Option<std::mem::Discriminant<FeedPhase>>,
    shown: HashMap<String, ActivityItem>,
    last_status: Option<StreamStatus>,
}

impl WatchPrinter {
    fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            last_phase: None,
            shown: HashMap::new(),
            last_status: None,
        }
    }

    fn print<W: Write, E: Write>(
        &mut self,
        view: &FeedView,
        out: &mut W,
        err: &mut E,
    ) -> io::Result<()> {
        let phase = discriminant(view.phase());
        let entered = self.last_phase != Some(phase);
        self.last_phase = Some(phase);

        match view.phase() {
            FeedPhase::Loaded(items) if entered => {
                self.renderer.write_view(view, out)?;
                self.shown = items
                    .iter()
                    .map(|item| (item.id.clone(), item.clone()))
                    .collect();
            }
            FeedPhase::Loaded(items) => {
                let fresh: Vec<&ActivityItem> = items
                    .iter()
                    .filter(|item| self.shown.get(&item.id) != Some(*item))
                    .collect();
                for item in fresh.into_iter().rev() {
                    writeln!(out)?;
                    self.renderer.write_card(item, out)?;
                    self.shown.insert(item.id.clone(), item.clone());
                }
            }
            _ if entered => self.renderer.write_view(view, out)?,
            _ => {}
        }

        if view.stream_status() != self.last_status.as_ref() {
            self.last_status = view.stream_status().cloned();
            if let Some(line) = self
                .last_status
                .as_ref()
                .and_then(|status| self.renderer.stream_status_line(status))
            {
                writeln!(err, "{line}")?;
            }
        }
        out.flush()
    }
}
