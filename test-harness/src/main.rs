//! Sync simulation harness
//!
//! Several devices of one user edit books and notes and sync in rounds
//! against an in-process server. After the last round every device must
//! hold exactly the server's live state, and the user's sequence numbers
//! must be unique and dense.

use anyhow::{bail, Context, Result};
use clap::Parser;
use noteserve_core::core_store::{Book, Note, UserId};
use noteserve_core::core_sync::{NewBook, NewNote, NoteUpdate, SyncClient, SyncReport, UserSyncSource};
use noteserve_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use noteserve_core::test_utils::{assert_usn_invariants, max_usn_of, TestEnv};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "test-harness")]
#[command(about = "noteserve sync simulation", long_about = None)]
struct Args {
    /// Devices syncing the same account
    #[arg(short, long, default_value_t = 3)]
    devices: usize,

    /// Edit/sync rounds
    #[arg(short, long, default_value_t = 10)]
    rounds: usize,

    /// Mutations per device per round
    #[arg(short, long, default_value_t = 5)]
    ops: usize,

    /// Fragment page size
    #[arg(short, long, default_value_t = 7)]
    limit: u32,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
}

/// What one device knows about the account while generating edits
struct Device {
    client: SyncClient<UserSyncSource>,
    totals: SyncReport,
}

fn live_books(device: &Device) -> Vec<Book> {
    device.client.replica().books.values().cloned().collect()
}

fn live_notes(device: &Device) -> Vec<Note> {
    device.client.replica().notes.values().cloned().collect()
}

/// Deterministic edit schedule: the mix depends only on the indices
fn mutate(env: &TestEnv, user: UserId, device: &Device, round: usize, dev: usize, op: usize) -> Result<()> {
    let books = live_books(device);
    let notes = live_notes(device);
    let pick = round * 31 + dev * 17 + op * 7;

    let result = match (pick % 6, books.first(), notes.is_empty()) {
        (0, _, _) | (_, None, _) => env
            .recorder
            .create_book(
                user,
                NewBook {
                    label: format!("r{round}-d{dev}-o{op}"),
                    ..Default::default()
                },
            )
            .map(|b| debug!(usn = b.usn, "book created")),
        (1 | 2, Some(_), _) | (_, Some(_), true) => {
            let book = &books[pick % books.len()];
            env.recorder
                .create_note(
                    user,
                    NewNote {
                        uuid: None,
                        book_uuid: book.uuid,
                        body: format!("note from device {dev} round {round}"),
                        public: pick % 2 == 0,
                        added_on: None,
                    },
                )
                .map(|n| debug!(usn = n.usn, "note created"))
        }
        (3, _, false) => {
            let note = &notes[pick % notes.len()];
            env.recorder
                .update_note(
                    user,
                    &note.uuid,
                    NoteUpdate {
                        body: Some(format!("edited on device {dev} round {round}")),
                        ..Default::default()
                    },
                )
                .map(|n| debug!(usn = n.usn, "note edited"))
        }
        (4, _, false) => {
            let note = &notes[pick % notes.len()];
            env.recorder
                .delete_note(user, &note.uuid)
                .map(|n| debug!(usn = n.usn, "note deleted"))
        }
        _ => {
            let book = &books[pick % books.len()];
            env.recorder
                .delete_book_with_notes(user, &book.uuid)
                .map(|(b, notes)| debug!(usn = b.usn, notes = notes.len(), "book deleted"))
        }
    };

    // A device may act on a stale replica; the server refuses edits of
    // tombstoned rows and those refusals are part of the simulation.
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_client_error() => {
            debug!(error = %e, "edit refused");
            Ok(())
        }
        Err(e) => Err(e).context("mutation failed"),
    }
}

fn accumulate(totals: &mut SyncReport, report: &SyncReport) {
    totals.pages += report.pages;
    totals.items_applied += report.items_applied;
    totals.items_expunged += report.items_expunged;
    totals.full_sync |= report.full_sync;
    totals.max_usn = report.max_usn;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging_with_config(LogConfig::new(args.log_level).with_target(false))?;

    let env = TestEnv::new();
    let user = env.user().id;
    let mut devices: Vec<Device> = (0..args.devices)
        .map(|_| Device {
            client: env.client(user, args.limit),
            totals: SyncReport::default(),
        })
        .collect();

    info!(devices = args.devices, rounds = args.rounds, ops = args.ops, limit = args.limit, "Starting simulation");

    for round in 0..args.rounds {
        for (dev, device) in devices.iter_mut().enumerate() {
            let report = device.client.sync().await?;
            accumulate(&mut device.totals, &report);

            for op in 0..args.ops {
                mutate(&env, user, device, round, dev, op)?;
            }
        }
        env.clock.advance(chrono::Duration::seconds(1));
        info!(round, max_usn = max_usn_of(&env.store, user), "Round complete");
    }

    // Final sync on every device, then compare against a fresh full sync
    for device in devices.iter_mut() {
        let report = device.client.sync().await?;
        accumulate(&mut device.totals, &report);
    }

    let mut reference = env.client(user, 100);
    reference.sync().await?;
    let expected = reference.replica();

    for (dev, device) in devices.iter().enumerate() {
        let replica = device.client.replica();
        if replica.books != expected.books || replica.notes != expected.notes {
            bail!("device {} diverged from the server", dev);
        }
        info!(
            device = dev,
            pages = device.totals.pages,
            applied = device.totals.items_applied,
            expunged = device.totals.items_expunged,
            "Device converged"
        );
    }

    assert_usn_invariants(&env.store, user);
    println!(
        "converged: {} devices, max_usn {}, {} live books, {} live notes",
        devices.len(),
        max_usn_of(&env.store, user),
        expected.books.len(),
        expected.notes.len()
    );
    Ok(())
}
