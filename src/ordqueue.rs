use crate::error::*;
use crossbeam_channel::{Receiver, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::thread;

/// Runs `work` on `threads` worker threads and feeds the results to `sink`
/// strictly in input order, regardless of which worker finishes first.
///
/// Stops early when `sink` returns an error; remaining work is abandoned.
pub(crate) fn map_ordered<I, T, W, S>(inputs: Vec<I>, threads: usize, work: W, mut sink: S) -> CatResult<()>
where
    I: Send,
    T: Send,
    W: Fn(I) -> T + Sync,
    S: FnMut(T) -> CatResult<()>,
{
    let threads = threads.max(1);
    thread::scope(|s| {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<(usize, I)>(threads);
        let (res_tx, res_rx) = crossbeam_channel::bounded(threads * 2);
        let work = &work;

        for n in 0..threads {
            let job_rx = job_rx.clone();
            let res_tx: Sender<ReverseTuple<T>> = res_tx.clone();
            thread::Builder::new().name(format!("decode{n}")).spawn_scoped(s, move || {
                for (i, item) in job_rx {
                    // receiver gone means the consumer has given up
                    if res_tx.send(ReverseTuple(i, work(item))).is_err() {
                        break;
                    }
                }
            }).map_err(|_| Error::ThreadSend)?;
        }
        drop(job_rx);
        drop(res_tx);

        thread::Builder::new().name("feed".into()).spawn_scoped(s, move || {
            for job in inputs.into_iter().enumerate() {
                if job_tx.send(job).is_err() {
                    break;
                }
            }
        }).map_err(|_| Error::ThreadSend)?;

        let mut iter = OrdQueueIter {
            receiver: res_rx,
            next_index: 0,
            receive_buffer: BinaryHeap::new(),
        };
        iter.try_for_each(&mut sink)
        // dropping the receiver here unblocks and stops the workers
    })
}

struct OrdQueueIter<T> {
    receiver: Receiver<ReverseTuple<T>>,
    next_index: usize,
    receive_buffer: BinaryHeap<ReverseTuple<T>>,
}

impl<T> Iterator for OrdQueueIter<T> {
    type Item = T;
    fn next(&mut self) -> Option<T> {
        while self.receive_buffer.peek().map(|i| i.0) != Some(self.next_index) {
            match self.receiver.recv() {
                Ok(item) => self.receive_buffer.push(item),
                Err(_) => {
                    // Sender dropped (but continue to dump receive_buffer buffer)
                    break;
                },
            }
        }

        if let Some(item) = self.receive_buffer.pop() {
            self.next_index += 1;
            Some(item.1)
        } else {
            None
        }
    }
}

struct ReverseTuple<T>(usize, T);
impl<T> PartialEq for ReverseTuple<T> {
    fn eq(&self, o: &Self) -> bool { o.0.eq(&self.0) }
}
impl<T> Eq for ReverseTuple<T> {}
impl<T> PartialOrd for ReverseTuple<T> {
    fn partial_cmp(&self, o: &Self) -> Option<Ordering> { Some(self.cmp(o)) }
}
impl<T> Ord for ReverseTuple<T> {
    fn cmp(&self, o: &Self) -> Ordering { o.0.cmp(&self.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn keeps_input_order() {
        let inputs: Vec<u64> = (0..50).collect();
        let mut out = Vec::new();
        map_ordered(inputs, 4, |n| {
            // later items finish first
            thread::sleep(Duration::from_micros(50 * (50 - n)));
            n * 2
        }, |n| {
            out.push(n);
            Ok(())
        }).unwrap();
        assert_eq!(out, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[test]
    fn sink_error_stops_early() {
        let mut seen = 0;
        let res = map_ordered((0..1000).collect::<Vec<u32>>(), 3, |n| n, |n| {
            seen += 1;
            if n == 10 { Err(Error::Aborted) } else { Ok(()) }
        });
        assert!(matches!(res, Err(Error::Aborted)));
        assert_eq!(seen, 11);
    }

    #[test]
    fn empty_input() {
        let mut called = false;
        map_ordered(Vec::<u8>::new(), 2, |n| n, |_| { called = true; Ok(()) }).unwrap();
        assert!(!called);
    }
}
