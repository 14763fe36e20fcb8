//! Fixed-size worker pool over a closed channel.

use crossbeam_channel::unbounded;
use std::thread;
use tracing::warn;

/// Drain `items` across `workers` OS threads, calling `work` for each item.
/// All items are queued up front and the sending side dropped, so workers
/// exit when the channel empties. Returns once every worker has joined.
/// `work` must handle per-item failures itself.
pub fn run_pool<T, F>(items: Vec<T>, workers: usize, work: F)
where
    T: Send,
    F: Fn(T) + Sync,
{
    if items.is_empty() {
        return;
    }
    let workers = workers.clamp(1, items.len());
    let (tx, rx) = unbounded();
    for item in items {
        // Send on an unbounded channel only fails if the receiver is gone.
        tx.send(item).ok();
    }
    drop(tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let work = &work;
            scope.spawn(move || {
                for item in rx.iter() {
                    work(item);
                }
            });
        }
    });
}

/// Resolve the effective worker count: `requested` capped at the number of
/// logical CPUs, defaulting to all of them.
pub fn effective_workers(requested: Option<usize>) -> usize {
    let cpus = num_cpus::get();
    match requested {
        None => cpus,
        Some(n) if n == 0 => {
            warn!("worker count of 0 requested, using 1");
            1
        }
        Some(n) if n > cpus => {
            warn!("{} workers requested but only {} CPUs, using {}", n, cpus, cpus);
            cpus
        }
        Some(n) => n,
    }
}
