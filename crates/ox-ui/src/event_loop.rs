//! UI task loop
//!
//! A worker thread drains a queue of boxed closures. `post` is
//! fire-and-forget; `post_synchronous` carries a one-shot completion
//! signal and blocks the caller until the worker has run the task.
//!
//! The worker marks itself as the process's UI loop thread, which the
//! global critical region checks against: fault handlers block inside
//! the region waiting on this loop, so the loop itself must never take
//! the region.

use ox_core::critical_region;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send>;

/// One-shot completion signal for synchronous posts
struct Completion {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl Completion {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    fn signal(&self) {
        let mut done = self.done.lock();
        *done = true;
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
    }
}

struct Shared {
    queue: Mutex<VecDeque<Task>>,
    condvar: Condvar,
    running: AtomicBool,
}

/// The UI task loop
pub struct EventLoop {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl EventLoop {
    pub fn new() -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            critical_region::mark_loop_thread();
            loop {
                let task = {
                    let mut queue = worker_shared.queue.lock();
                    loop {
                        if let Some(task) = queue.pop_front() {
                            break Some(task);
                        }
                        // Pending tasks drain before shutdown is honored.
                        if !worker_shared.running.load(Ordering::Acquire) {
                            break None;
                        }
                        worker_shared.condvar.wait(&mut queue);
                    }
                };
                match task {
                    Some(task) => task(),
                    None => break,
                }
            }
        });

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Queue a task for the loop thread and return immediately.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        queue.push_back(Box::new(task));
        self.shared.condvar.notify_one();
    }

    /// Run a task on the loop thread and block until it has executed.
    ///
    /// Calling from the loop thread itself runs the task inline;
    /// queueing there would wait on the queue this thread drains.
    pub fn post_synchronous<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if critical_region::is_loop_thread() {
            task();
            return;
        }

        let completion = Completion::new();
        let signal = Arc::clone(&completion);
        self.post(move || {
            task();
            signal.signal();
        });
        completion.wait();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
