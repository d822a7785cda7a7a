//! Execution contexts that run producer tasks.

use std::thread;


/// Unit of work submitted to an execution context
///
/// A producer task blocks while its generator is suspended, so it should run somewhere that
/// tolerates blocking. If a context drops a task without running it, the corresponding
/// generator resolves as cancelled.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that can run a task concurrently with the caller
pub trait Execute {
    /// Submit a task to be run
    fn execute(&self, task: Task);
}

impl<E: Execute + ?Sized> Execute for &E {
    fn execute(&self, task: Task) {
        (**self).execute(task);
    }
}

impl<E: Execute + ?Sized> Execute for std::sync::Arc<E> {
    fn execute(&self, task: Task) {
        (**self).execute(task);
    }
}


/// Runs each task on a newly spawned OS thread
#[derive(Debug, Clone, Default)]
pub struct ThreadPerTask {
    name: Option<String>,
    stack_size: Option<usize>,
}

impl ThreadPerTask {
    /// Construct with default thread settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name given to spawned threads
    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Ownership-chaining version of [`set_name`](Self::set_name)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// Set the stack size of spawned threads, in bytes
    pub fn set_stack_size(&mut self, stack_size: usize) -> &mut Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Ownership-chaining version of [`set_stack_size`](Self::set_stack_size)
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.set_stack_size(stack_size);
        self
    }
}

impl Execute for ThreadPerTask {
    fn execute(&self, task: Task) {
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        // on failure the task is dropped, which cancels its generator
        if let Err(e) = builder.spawn(task) {
            error!(%e, "failed to spawn producer thread");
        }
    }
}


/// Runs each task on the runtime's blocking thread pool
impl Execute for tokio::runtime::Handle {
    fn execute(&self, task: Task) {
        // the join handle is not needed; the generator's result handle tracks the task.
        drop(self.spawn_blocking(task));
    }
}

/// Runs each task on the runtime's blocking thread pool
impl Execute for tokio::runtime::Runtime {
    fn execute(&self, task: Task) {
        self.handle().execute(task);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn thread_per_task_names_threads() {
        let (send, recv) = mpsc::channel();
        ThreadPerTask::new()
            .with_name("producer")
            .with_stack_size(256 * 1024)
            .execute(Box::new(move || {
                send.send(thread::current().name().map(str::to_owned)).unwrap();
            }));
        assert_eq!(recv.recv().unwrap().as_deref(), Some("producer"));
    }

    #[test]
    fn tokio_runs_blocking_tasks() {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (send, recv) = mpsc::channel();
        runtime.execute(Box::new(move || send.send(7).unwrap()));
        assert_eq!(recv.recv().unwrap(), 7);
    }
}
