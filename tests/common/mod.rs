#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Read, Write};
use std::rc::Rc;
use std::time::Duration;

use mdb_master::device::{Config, Device};

/// SETUP answer: level 2, currency 975, scaling 100, two decimals,
/// stacker capacity 300, escrow, credits 2, 5, 10, 20, 50, 100.
pub const SETUP: &str = "021975006402012CFFFFFF02050A14326400000000000000000000";
/// Level 1 identification of an "ITL" "NV9USB", software version 123.
pub const ID1: &str = "49544C3030303031323334353637384E56395553422020202020200123";

/// Level 2 identification, with the given option bits.
pub fn id2(option_bits: u32) -> String {
    format!("{}{:08X}", ID1, option_bits)
}

/// Simulated MDB adapter.
///
/// Every complete command line written to it consumes the next scripted
/// exchange, which checks the command and queues the reply lines. Unscripted
/// commands are recorded and get no reply. Reading with nothing queued fails
/// with `TimedOut`, like a serial port with a read timeout.
pub struct FakeAdapter {
    script: VecDeque<(String, Option<String>)>,
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    sent: Vec<String>,
    do_read_error: bool,
}

pub struct AdapterIOPlane(Rc<RefCell<FakeAdapter>>);

impl AdapterIOPlane {
    pub fn new(adapter: &Rc<RefCell<FakeAdapter>>) -> AdapterIOPlane {
        AdapterIOPlane(adapter.clone())
    }
}

impl FakeAdapter {
    pub fn new() -> Rc<RefCell<FakeAdapter>> {
        Rc::new(RefCell::new(FakeAdapter {
            script: VecDeque::new(),
            rx: VecDeque::new(),
            tx: Vec::new(),
            sent: Vec::new(),
            do_read_error: false,
        }))
    }

    /// Answer `command` with `reply`. Several lines may be separated by `\r\n`.
    pub fn expect(&mut self, command: &str, reply: &str) -> &mut Self {
        self.script
            .push_back((command.to_string(), Some(reply.to_string())));
        self
    }

    pub fn expect_silence(&mut self, command: &str) -> &mut Self {
        self.script.push_back((command.to_string(), None));
        self
    }

    /// Versions, generic master enable and the bus reset that follows it.
    pub fn expect_prepare(&mut self) -> &mut Self {
        self.expect("V", "v,4.1.0.23,0123456789AB")
            .expect("H", "h,1.0.0.0,MDB-USB")
            .expect("M,1", "m,ACK")
            .expect_silence("R,RESET")
    }

    /// Queue a line the adapter sends on its own.
    pub fn push_line(&mut self, line: &str) {
        self.rx.extend(line.bytes());
        self.rx.extend(b"\r\n");
    }

    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn script_done(&self) -> bool {
        self.script.is_empty()
    }

    pub fn trigger_read_error(&mut self) {
        self.do_read_error = true;
    }

    fn command_line(&mut self, line: String) {
        if let Some((expected, reply)) = self.script.pop_front() {
            assert_eq!(line, expected, "unexpected command");
            if let Some(reply) = reply {
                self.push_line(&reply);
            }
        }
        self.sent.push(line);
    }
}

impl Read for AdapterIOPlane {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        if inner.do_read_error {
            inner.do_read_error = false;
            return Err(Error::new(ErrorKind::PermissionDenied, "read error"));
        }
        if inner.rx.is_empty() {
            return Err(Error::new(ErrorKind::TimedOut, "no data"));
        }
        let len = buf.len().min(inner.rx.len());
        for (slot, byte) in buf.iter_mut().zip(inner.rx.drain(..len)) {
            *slot = byte;
        }
        Ok(len)
    }
}

impl Write for AdapterIOPlane {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut inner = self.0.borrow_mut();
        inner.tx.extend_from_slice(buf);
        while let Some(pos) = inner.tx.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = inner.tx.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]).into_owned();
            inner.command_line(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Device with short timeouts, talking to `adapter`.
pub fn device(adapter: &Rc<RefCell<FakeAdapter>>) -> Device<AdapterIOPlane> {
    Device::with_config(
        AdapterIOPlane::new(adapter),
        Config {
            timeout: Duration::from_millis(20),
            bus_reset_settle: Duration::from_millis(1),
        },
    )
}
