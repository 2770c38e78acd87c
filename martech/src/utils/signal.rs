use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Stop flag shared between a blocking procedure and whoever may want to
/// cancel it. Procedures check it once per cycle.
pub type StopSignal = Arc<AtomicBool>;

/// A fresh, unset stop flag.
pub fn stop_signal() -> StopSignal {
    Arc::new(AtomicBool::new(false))
}

/// True once the flag has been raised.
pub fn stopped(signal: &StopSignal) -> bool {
    signal.load(Ordering::Relaxed)
}

/// Raise the stop flag when ctrl-c is pressed. Must be called from within a
/// tokio runtime.
pub fn stop_on_ctrl_c(signal: StopSignal) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl-c received, stopping after the current cycle");
                signal.store(true, Ordering::Relaxed);
            }
            Err(e) => warn!("unable to listen for ctrl-c: {e}"),
        }
    });
}
