use crate::{
    components::qct::operator::Operator,
    devices::hardware::{
        sercom::{Sercom, SerialLink},
        thetis::{Thetis, ThetisConfig},
    },
    error::Result,
    messages::thetis::sentence::{Command, Listener},
};
use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// Serial link that plays back replies. Each reply is queued behind a
/// trigger, and is placed in the input buffer when a written command
/// contains that trigger. Replies are consumed strictly in order so a test
/// reads like the conversation it models.
#[derive(Default)]
pub struct MockLink {
    /// Pending (trigger, reply) pairs.
    script: VecDeque<(String, Vec<u8>)>,
    /// Bytes waiting to be read.
    input: VecDeque<u8>,
    /// Every byte written by the driver.
    pub written: Vec<u8>,
    /// Every pause the driver asked for.
    pub pauses: Vec<Duration>,
}

impl MockLink {
    /// Empty link, nothing to read and nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply that is delivered once a command containing `trigger`
    /// has been written.
    pub fn on<B: AsRef<[u8]>>(mut self, trigger: &str, reply: B) -> Self {
        self.script
            .push_back((trigger.to_string(), reply.as_ref().to_vec()));
        self
    }

    /// Bytes that are already waiting before anything is written.
    pub fn with_input<B: AsRef<[u8]>>(mut self, bytes: B) -> Self {
        self.input.extend(bytes.as_ref());
        self
    }

    /// Everything written so far as text.
    pub fn written_text(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Written text split on line feeds, without the line feeds.
    pub fn written_lines(&self) -> Vec<String> {
        self.written_text()
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replies that were never triggered.
    pub fn unused_replies(&self) -> usize {
        self.script.len()
    }

    /// Total time the driver asked to wait.
    pub fn paused_for(&self) -> Duration {
        self.pauses.iter().sum()
    }
}

impl SerialLink for MockLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.written.extend_from_slice(bytes);
        let text = String::from_utf8_lossy(bytes);
        let triggered = matches!(self.script.front(), Some((trigger, _)) if text.contains(trigger.as_str()));
        if triggered {
            if let Some((_, reply)) = self.script.pop_front() {
                self.input.extend(reply);
            }
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(self.input.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.input.clear();
        Ok(())
    }

    fn pause(&mut self, duration: Duration) {
        self.pauses.push(duration);
    }
}

/// Scripted link whose record stays readable after the driver owning it
/// has been dropped, e.g. when a procedure returns an error.
#[derive(Clone)]
pub struct SharedLink(Arc<Mutex<MockLink>>);

impl SharedLink {
    pub fn new(link: MockLink) -> Self {
        Self(Arc::new(Mutex::new(link)))
    }

    /// The underlying scripted link.
    pub fn link(&self) -> MutexGuard<'_, MockLink> {
        self.0.lock().unwrap()
    }
}

impl SerialLink for SharedLink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.link().write_all(bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.link().read(buf)
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        self.link().bytes_to_read()
    }

    fn clear(&mut self) -> Result<()> {
        self.link().clear()
    }

    fn pause(&mut self, duration: Duration) {
        self.link().pause(duration)
    }
}

/// A `$PWETA` reply line as the controller would send it.
pub fn thetis_reply(listener: Listener, mnemonic: &str, args: &[&str]) -> String {
    let command = args
        .iter()
        .fold(Command::response(listener, mnemonic), |command, arg| command.arg(arg));
    format!("{}\r\n", command.encode())
}

/// Profiler driver over a scripted link.
pub fn mock_thetis(link: MockLink) -> Thetis<MockLink> {
    Thetis::with_sercom(Sercom::new(link, "mock"), ThetisConfig::new("mock"))
}

/// Directory used by tests that write files, unique per call.
pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("martech-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create scratch dir");
    dir
}

/// Operator that answers from a script and records what it was shown.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    /// Every prompt, in order.
    pub prompts: Vec<String>,
    /// Every notice, in order.
    pub notices: Vec<String>,
}

impl ScriptedOperator {
    /// Operator giving the answers in order, then empty answers.
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Operator for ScriptedOperator {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.prompts.push(prompt.to_string());
        Ok(self.answers.pop_front().unwrap_or_default())
    }

    fn notify(&mut self, message: &str) -> Result<()> {
        self.notices.push(message.to_string());
        Ok(())
    }
}
