//! Driving a controller from the terminal

use crate::execution::PipelineController;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

/// How supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supervision {
    /// Idle with every output stream drained
    Settled,
    /// A second interrupt arrived before the cancelled stage's streams closed
    Abandoned,
}

/// Forward every Ctrl-C as one message
pub fn interrupt_channel() -> UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl-C: {}", e);
                break;
            }
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

/// Drive the controller until it settles
///
/// The first interrupt cancels the pipeline. A descendant of the killed
/// process can keep its output pipes open, so a further interrupt stops
/// waiting and leaves the remaining streams to be torn down with the process.
pub async fn supervise(
    controller: &mut PipelineController,
    interrupts: &mut UnboundedReceiver<()>,
) -> Supervision {
    let mut cancel_requested = false;

    while !controller.is_settled() {
        tokio::select! {
            processed = controller.process_next() => {
                if !processed {
                    break;
                }
            }
            Some(()) = interrupts.recv() => {
                if cancel_requested {
                    warn!(
                        "Interrupted again while {:?}; abandoning open output streams",
                        controller.state()
                    );
                    return Supervision::Abandoned;
                }
                info!("Interrupt received, stopping (press Ctrl-C again to quit immediately)");
                cancel_requested = true;
                controller.cancel().await;
            }
        }
    }

    debug!("Controller settled");
    Supervision::Settled
}
