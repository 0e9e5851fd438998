//! Scripted in-memory engine for tests.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Engine;
use crate::channel::{HostOutput, HostStreams};

enum Step {
    Output(Vec<u8>),
    Sleep(Duration),
    HostPrint(String),
    WaitUntil(Arc<AtomicBool>),
    Panic,
}

/// What one `execute` call does, in order, before returning its code.
pub(crate) struct Script {
    code: i32,
    steps: Vec<Step>,
}

impl Script {
    pub(crate) fn new(code: i32) -> Self {
        Self {
            code,
            steps: Vec::new(),
        }
    }

    /// Write to the engine buffer.
    pub(crate) fn output(mut self, text: &str) -> Self {
        self.steps.push(Step::Output(text.as_bytes().to_vec()));
        self
    }

    pub(crate) fn sleep(mut self, ms: u64) -> Self {
        self.steps.push(Step::Sleep(Duration::from_millis(ms)));
        self
    }

    /// Print through the attached host stdout handle.
    pub(crate) fn host_print(mut self, text: &str) -> Self {
        self.steps.push(Step::HostPrint(text.to_string()));
        self
    }

    /// Block until `flag` is set.
    pub(crate) fn wait_until(mut self, flag: Arc<AtomicBool>) -> Self {
        self.steps.push(Step::WaitUntil(flag));
        self
    }

    /// Crash the engine call.
    pub(crate) fn panics(mut self) -> Self {
        self.steps.push(Step::Panic);
        self
    }
}

/// Engine double with a byte buffer and a queue of scripted commands.
pub(crate) struct ScriptedEngine {
    resets_on_read: bool,
    buffer: Mutex<Vec<u8>>,
    appends: Mutex<Vec<Vec<u8>>>,
    scripts: Mutex<VecDeque<Script>>,
    commands: Mutex<Vec<String>>,
    host: Mutex<Option<HostOutput>>,
}

impl ScriptedEngine {
    /// Engine whose read consumes the buffer.
    pub(crate) fn new() -> Self {
        Self::build(true)
    }

    /// Engine whose read returns the whole buffer every time.
    pub(crate) fn cumulative() -> Self {
        Self::build(false)
    }

    fn build(resets_on_read: bool) -> Self {
        Self {
            resets_on_read,
            buffer: Mutex::new(Vec::new()),
            appends: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            host: Mutex::new(None),
        }
    }

    pub(crate) fn write(&self, bytes: &[u8]) {
        self.buffer.lock().unwrap().extend_from_slice(bytes);
    }

    pub(crate) fn contents(&self) -> Vec<u8> {
        self.buffer.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.buffer.lock().unwrap().clear();
    }

    /// Every `append_output` call, in order.
    pub(crate) fn appends(&self) -> Vec<Vec<u8>> {
        self.appends.lock().unwrap().clone()
    }

    /// Queue the behavior of the next unscripted `execute` call.
    pub(crate) fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Route `host_print` steps through a session's host stdout.
    pub(crate) fn attach_host(&self, streams: &HostStreams) {
        *self.host.lock().unwrap() = Some(streams.stdout());
    }

    /// Command texts received so far.
    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl Engine for ScriptedEngine {
    fn execute(&self, command: &[u8]) -> i32 {
        self.commands
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(command).into_owned());

        let Some(script) = self.scripts.lock().unwrap().pop_front() else {
            return 0;
        };

        for step in script.steps {
            match step {
                Step::Output(bytes) => self.write(&bytes),
                Step::Sleep(duration) => std::thread::sleep(duration),
                Step::HostPrint(text) => {
                    let host = self.host.lock().unwrap().clone();
                    if let Some(mut out) = host {
                        out.write_all(text.as_bytes()).unwrap();
                    }
                }
                Step::WaitUntil(flag) => {
                    while !flag.load(Ordering::SeqCst) {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                }
                Step::Panic => panic!("scripted engine crashed"),
            }
        }
        script.code
    }

    fn read_output(&self) -> Vec<u8> {
        let mut buffer = self.buffer.lock().unwrap();
        if self.resets_on_read {
            std::mem::take(&mut *buffer)
        } else {
            buffer.clone()
        }
    }

    fn append_output(&self, bytes: &[u8]) {
        self.appends.lock().unwrap().push(bytes.to_vec());
        self.buffer.lock().unwrap().extend_from_slice(bytes);
    }

    fn resets_on_read(&self) -> bool {
        self.resets_on_read
    }
}
