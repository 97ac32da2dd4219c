// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::error;

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Ctrl-C only raises a flag that the hashing and zip copy loops check. An
/// interrupted `sha1sums` run then leaves the manifest untouched, and an
/// interrupted `firmware` run drops its temporary output zip instead of
/// leaving it behind.
fn cancel_signal() -> Arc<AtomicBool> {
    let signal = Arc::new(AtomicBool::new(false));
    let handler_signal = signal.clone();

    if let Err(e) = ctrlc::set_handler(move || handler_signal.store(true, Ordering::SeqCst)) {
        eprintln!("Failed to set Ctrl-C handler: {e}");
    }

    signal
}

fn main() -> ExitCode {
    let cancel_signal = cancel_signal();

    let Err(e) = blobtool::cli::args::main(&LOGGING_INITIALIZED, &cancel_signal) else {
        return ExitCode::SUCCESS;
    };

    // The debug representation includes the whole context chain.
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        error!("{e:?}");
    } else {
        eprintln!("{e:?}");
    }

    ExitCode::FAILURE
}
