use std::time::Duration;

use anyhow::{bail, Context, Result};

use mdb_master::message::SniffFrame;
use mdb_master::{Device, RequestMessage, ResponseMessage};

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args();
    args.next(); // Skip program name
    let port = args.next().unwrap_or_else(|| "/dev/ttyACM0".to_string());

    let serial = serialport::new(&port, 115_200)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("Failed to open serial port {}", port))?;

    let mut device = Device::new(serial);
    let versions = device.connect()?;
    println!(
        "Adapter software {}, hardware {}",
        versions.software, versions.hardware
    );

    match device.request(&RequestMessage::SetMdbSniffing { enabled: true })? {
        ResponseMessage::Sniff(SniffFrame::Ack) => {}
        other => bail!("Adapter refused to sniff: {:?}", other),
    }
    println!("Sniffing, press Ctrl-C to stop.");

    let channel = device.channel_mut();
    loop {
        match channel.receive(Duration::from_secs(1))? {
            Some(ResponseMessage::Sniff(SniffFrame::Frame(fields))) => {
                println!("{}", fields.join(" "))
            }
            Some(other) => println!("{:?}", other),
            None => {}
        }
    }
}
