mod common;

use common::{id2, FakeAdapter, ID1, SETUP};
use mdb_master::bill_validator::{BillValidator, State};
use mdb_master::mdb::bill_validator::{decode_setup, Stacker};
use mdb_master::peripheral::{Error, Peripheral};
use mdb_master::BillType;

fn expect_setup_sequence(adapter: &mut FakeAdapter) {
    adapter
        .expect("R,31", &format!("p,{}", SETUP))
        .expect("R,32,FFFF", "p,ACK")
        .expect("R,37,00", &format!("p,{}", ID1))
        .expect("R,37,02", &format!("p,{}", id2(0)))
        .expect("R,37,0100000000", "p,ACK")
        .expect("R,36", "p,0014")
        .expect("R,34,FFFFFFFF", "p,ACK");
}

fn setup_bytes() -> Vec<u8> {
    (0..SETUP.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&SETUP[i..i + 2], 16).unwrap())
        .collect()
}

#[test]
fn reset_setup_and_enable() {
    let adapter = FakeAdapter::new();
    adapter.borrow_mut().expect("R,30", "p,ACK");
    expect_setup_sequence(&mut adapter.borrow_mut());
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    validator.prepare(&mut device).unwrap();
    assert_eq!(validator.state(), State::ResetPending);
    validator.initialize(&mut device).unwrap();
    assert_eq!(validator.state(), State::Polling);
    assert!(adapter.borrow().script_done());

    let status = validator.status();
    assert_eq!(status.setup, Some(decode_setup(&setup_bytes()).unwrap()));
    let setup = status.setup.as_ref().unwrap();
    assert_eq!(setup.currency_code, Some(975));
    assert_eq!(setup.country_code, None);
    let identification = status.identification.as_ref().unwrap();
    assert_eq!(identification.manufacturer_code, "ITL");
    assert_eq!(identification.serial_number, "000012345678");
    assert_eq!(identification.model_number, "NV9USB");
    assert_eq!(identification.software_version, 123);
    let features = status.optional_features.unwrap();
    assert!(!features.bill_recycling);
    assert!(!features.file_transport_layer);
    assert_eq!(
        status.stacker,
        Some(Stacker {
            full: false,
            bills: 20
        })
    );
    assert_eq!(status.recycler_setup, None);
    assert_eq!(status.dispense_status, None);
}

#[test]
fn validator_reset_reruns_setup_before_escrow() {
    let adapter = FakeAdapter::new();
    adapter.borrow_mut().expect("R,30", "p,ACK");
    adapter.borrow_mut().expect("R,33", "p,06");
    expect_setup_sequence(&mut adapter.borrow_mut());
    adapter
        .borrow_mut()
        .expect("R,33", "p,91")
        .expect("R,35,00", "p,ACK");
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    validator.prepare(&mut device).unwrap();
    assert!(validator.tick(&mut device).unwrap());
    assert_eq!(validator.state(), State::Polling);
    assert!(validator.tick(&mut device).unwrap());
    assert!(adapter.borrow().script_done());

    let sent = adapter.borrow().sent().to_vec();
    let setup = sent.iter().position(|line| line == "R,31").unwrap();
    let escrow = sent.iter().position(|line| line == "R,35,00").unwrap();
    assert!(setup < escrow);
    assert_eq!(
        validator
            .status()
            .bill_value(BillType::new(1).unwrap()),
        Some(500)
    );
}

#[test]
fn reset_event_in_the_same_poll() {
    let adapter = FakeAdapter::new();
    adapter.borrow_mut().expect("R,33", "p,0691");
    expect_setup_sequence(&mut adapter.borrow_mut());
    adapter.borrow_mut().expect("R,35,00", "p,NACK");
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    assert!(validator.tick(&mut device).unwrap());
    assert!(adapter.borrow().script_done());
    assert_eq!(adapter.borrow().sent().last().unwrap(), "R,35,00");
}

#[test]
fn setup_timeout_is_fatal() {
    let adapter = FakeAdapter::new();
    adapter
        .borrow_mut()
        .expect("R,33", "p,06")
        .expect("R,31", &format!("p,{}", SETUP))
        .expect_silence("R,32,FFFF");
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    let err = validator.tick(&mut device).unwrap_err();
    assert!(err.is_timeout());
    assert!(matches!(
        err,
        Error::Transaction {
            command: "SECURITY",
            ..
        }
    ));
}

#[test]
fn poll_without_validator() {
    let adapter = FakeAdapter::new();
    adapter
        .borrow_mut()
        .expect_silence("R,30")
        .expect("R,33", "p,NACK")
        .expect_silence("R,33");
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    validator.prepare(&mut device).unwrap();
    assert_eq!(validator.state(), State::Absent);
    assert!(!validator.tick(&mut device).unwrap());
    assert!(!validator.tick(&mut device).unwrap());
}

#[test]
fn recycler_setup_and_dispense_status() {
    let adapter = FakeAdapter::new();
    let routing = "03".repeat(16);
    let counts = "0005".repeat(16);
    adapter
        .borrow_mut()
        .expect("R,31", &format!("p,{}", SETUP))
        .expect("R,32,FFFF", "p,ACK")
        .expect("R,37,00", &format!("p,{}", ID1))
        .expect("R,37,02", &format!("p,{}", id2(3)))
        .expect("R,37,0100000002", "p,ACK")
        .expect("R,37,03", "p,000F")
        .expect(&format!("R,37,040000{}", routing), "p,ACK")
        .expect("R,36", "p,8164")
        .expect("R,34,FFFFFFFF", "p,ACK")
        .expect("R,37,05", &format!("p,8000{}", counts));
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    validator.initialize(&mut device).unwrap();
    assert!(adapter.borrow().script_done());

    let status = validator.status();
    assert!(status.bill_recycling());
    assert!(status.optional_features.unwrap().file_transport_layer);
    let recycler = status.recycler_setup.unwrap();
    assert_eq!(recycler.routing.iter().filter(|r| **r).count(), 4);
    assert!(recycler.routing[12]);
    assert_eq!(
        status.stacker,
        Some(Stacker {
            full: true,
            bills: 0x0164
        })
    );
    let dispense = status.dispense_status.unwrap();
    assert!(dispense.dispenser_full[0]);
    assert_eq!(dispense.bill_counts, [5; 16]);
}

#[test]
fn recycler_enable_refused() {
    let adapter = FakeAdapter::new();
    adapter
        .borrow_mut()
        .expect("R,31", &format!("p,{}", SETUP))
        .expect("R,32,FFFF", "p,ACK")
        .expect("R,37,00", &format!("p,{}", ID1))
        .expect("R,37,02", &format!("p,{}", id2(2)))
        .expect("R,37,0100000002", "p,ACK")
        .expect("R,37,03", "p,FFFF")
        .expect(&format!("R,37,040000{}", "03".repeat(16)), "p,NACK");
    let mut device = common::device(&adapter);
    let mut validator = BillValidator::default();

    let err = validator.initialize(&mut device).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol {
            command: "EXP.RECYCLER ENABLE",
            ..
        }
    ));
}
