//! Operations over a bootstrapped TCP session and over the scripted mock.

mod common;

use common::MockInstrument;
use mpa_scpi::config::Timing;
use mpa_scpi::operations::{PreFecVendor, RegisterPage, ToggleOutcome};
use mpa_scpi::protocol::{LinkState, Scpi};
use mpa_scpi::session::{Session, Transaction};
use mpa_scpi::transport::MockTransport;
use std::sync::{Arc, Mutex};
use tracing_test::traced_test;

const FAULT_MESSAGE: &str = "Instrument reported an error";

/// Laser plus MAC traffic generator, both starting off.
fn traffic_instrument() -> impl FnMut(&str) -> Option<String> + Send + 'static {
    let laser = Arc::new(Mutex::new(false));
    let traffic = Arc::new(Mutex::new(false));
    move |line: &str| {
        let state_reply = |on: bool| {
            Some(format!(
                "{}\n0, \"No error\"\n",
                if on { "ON" } else { "OFF" }
            ))
        };
        match line {
            ":OUTPUT:OPTIC? ;:SYSTem:ERRor?" => state_reply(*laser.lock().unwrap()),
            ":SOURCE:MAC:TRAFFIC? ;:SYSTem:ERRor?" => state_reply(*traffic.lock().unwrap()),
            ":OUTPUT:OPTIC ;:SYSTem:ERRor?" => {
                let mut on = laser.lock().unwrap();
                *on = !*on;
                Some("0, \"No error\"\n".to_string())
            }
            ":SOURCE:MAC:TRAFFIC ;:SYSTem:ERRor?" => {
                let mut on = traffic.lock().unwrap();
                *on = !*on;
                Some("0, \"No error\"\n".to_string())
            }
            ":SENSE:DATA? CSTATUS:PCS:PHY:LINK:ACTIVE ;:SYSTem:ERRor?" => {
                Some("\n1\n0, \"No error\"\n".to_string())
            }
            "*REM" => None,
            _ => Some("0, \"No error\"\n".to_string()),
        }
    }
}

fn count(lines: &[String], prefix: &str) -> usize {
    lines.iter().filter(|line| line.starts_with(prefix)).count()
}

#[tokio::test]
async fn toggles_are_idempotent_over_tcp() {
    let mock = MockInstrument::builder()
        .responder(traffic_instrument())
        .start()
        .await;
    let mut session = Session::bootstrap("127.0.0.1", mock.base_port, Timing::immediate())
        .await
        .unwrap();

    assert_eq!(session.laser_on().await.unwrap(), ToggleOutcome::Toggled);
    assert_eq!(session.laser_on().await.unwrap(), ToggleOutcome::AlreadySet);
    assert_eq!(
        session.traffic_mac_start().await.unwrap(),
        ToggleOutcome::Toggled
    );
    assert_eq!(
        session.traffic_mac_stop().await.unwrap(),
        ToggleOutcome::Toggled
    );
    assert_eq!(
        session.traffic_mac_stop().await.unwrap(),
        ToggleOutcome::AlreadySet
    );
    assert_eq!(session.link_status().await.unwrap(), LinkState::Active);

    session.close().await.unwrap();
    mock.settle().await;

    let lines = mock.control_lines();
    assert_eq!(count(&lines, ":OUTPUT:OPTIC ;"), 1);
    assert_eq!(count(&lines, ":SOURCE:MAC:TRAFFIC ;"), 2);
    assert_eq!(count(&lines, ":OUTPUT:OPTIC? ;"), 2);
}

#[tokio::test]
async fn checked_transaction_frames_on_no_error() {
    let mock = MockInstrument::builder()
        .responder(|line: &str| {
            (line == ":sense:data? FLOAT:PHYSICAL:QSFP:TX:POWER:LEVEL:SUM ;:SYSTem:ERRor?")
                .then(|| "\n-1.27\n0, \"No error\"\n".to_string())
        })
        .start()
        .await;
    let mut session = Session::bootstrap("127.0.0.1", mock.base_port, Timing::immediate())
        .await
        .unwrap();

    let reply = session
        .transact(&Transaction::checked("read_tx_power", Scpi::TxPowerQsfp))
        .await
        .unwrap();
    assert!(reply.as_str().starts_with("\n-1.27\n0, \"No error"));
    assert_eq!(reply.first_value(), Some("-1.27"));
    session.close().await.unwrap();
}

#[tokio::test]
#[traced_test]
async fn faulty_reply_is_logged_once_and_still_returned() {
    let transport = MockTransport::new(|line: &str| {
        line.starts_with(":INITiate")
            .then(|| "Error Code: \"-200, \"Execution error\"\n0, \"No error\"\n".to_string())
    });
    let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());

    let reply = session.test_start().await.unwrap();
    assert!(reply.contains("-200"));

    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains(FAULT_MESSAGE)).count() {
            1 => Ok(()),
            n => Err(format!("expected one fault record, found {n}")),
        }
    });
}

#[tokio::test]
#[traced_test]
async fn clean_replies_log_no_faults() {
    let transport = MockTransport::new(|_| Some("0, \"No error\"\n".to_string()));
    let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());

    session.test_stop().await.unwrap();
    session.create_session().await.unwrap();

    assert!(!logs_contain(FAULT_MESSAGE));
}

/// Register map where every byte is `address ^ page`.
fn register_instrument(peeks: Arc<Mutex<Vec<(u8, u8)>>>) -> MockTransport {
    let selected = Arc::new(Mutex::new((0u8, 0u8)));
    MockTransport::new(move |line: &str| {
        let mut current = selected.lock().unwrap();
        if let Some(page) = line.strip_prefix(":SENSE:EXPERT:I2C:PEEK:PAGESEL ") {
            current.0 = page.trim().parse().unwrap();
            None
        } else if let Some(rest) = line.strip_prefix(":SENSE:EXPERT:I2C:PEEK:REGADDR ") {
            current.1 = rest.split_whitespace().next().unwrap().parse().unwrap();
            Some("0, \"No error\"\n".to_string())
        } else if line.starts_with(":SENSE:EXPERT:I2C:PEEK:Trigger") {
            peeks.lock().unwrap().push(*current);
            Some("0, \"No error\"\n".to_string())
        } else if line.ends_with("PEEK:REGDATA") {
            Some(format!("\n{}\n", current.1 ^ current.0))
        } else {
            None
        }
    })
}

#[tokio::test]
async fn base_page_dump_peeks_addresses_0_to_127() {
    let peeks = Arc::new(Mutex::new(Vec::new()));
    let mut session = Session::from_transport(
        register_instrument(peeks.clone()),
        "bert",
        8006,
        Timing::immediate(),
    );

    let dump = session.dump_page(RegisterPage::Base).await.unwrap();

    let expected: Vec<(u8, u8)> = (0..=127).map(|address| (0, address)).collect();
    assert_eq!(*peeks.lock().unwrap(), expected);
    assert_eq!(dump.bytes(), (0..=127).collect::<Vec<u8>>().as_slice());
}

#[tokio::test]
async fn upper_page_dump_peeks_addresses_128_to_255() {
    let peeks = Arc::new(Mutex::new(Vec::new()));
    let mut session = Session::from_transport(
        register_instrument(peeks.clone()),
        "bert",
        8006,
        Timing::immediate(),
    );

    let dump = session.dump_page(RegisterPage::Upper(32)).await.unwrap();

    let expected: Vec<(u8, u8)> = (128..=255).map(|address| (32, address)).collect();
    assert_eq!(*peeks.lock().unwrap(), expected);
    assert_eq!(dump.get(182), Some(182 ^ 32));
    assert!(dump.to_string().contains("\nB0:"));
}

#[tokio::test]
async fn pre_fec_ber_reads_vendor_location() {
    let address = Arc::new(Mutex::new(0u8));
    let transport = MockTransport::new(move |line: &str| {
        let mut current = address.lock().unwrap();
        if let Some(rest) = line.strip_prefix(":SENSE:EXPERT:I2C:PEEK:REGADDR ") {
            *current = rest.split_whitespace().next().unwrap().parse().unwrap();
            Some("0, \"No error\"\n".to_string())
        } else if line.ends_with("PEEK:REGDATA") {
            match *current {
                182 => Some("\n203\n".to_string()),
                183 => Some("\n232\n".to_string()),
                _ => Some("\n0\n".to_string()),
            }
        } else {
            None
        }
    });
    let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());

    let ber = session.read_pre_fec_ber(PreFecVendor::Inphi).await.unwrap();
    assert_eq!(ber.to_string(), "1.0 E 4");
    assert_eq!(
        count(&session.transport().sent_lines(), ":SENSE:EXPERT:I2C:PEEK:PAGESEL 32"),
        2
    );
}

#[tokio::test]
#[traced_test]
async fn launch_reads_past_no_error_without_classifying() {
    let mock = MockInstrument::builder()
        .responder(|line: &str| {
            (line == ":SYSTem:APPLication:LAUNch TermEth100GL2Traffic 1 ;:SYSTem:ERRor?").then(
                || "\n-221, \"Settings conflict\"\n0, \"No error\"\nTermEth100GL2Traffic_101\n".to_string(),
            )
        })
        .start()
        .await;
    let mut session = Session::bootstrap("127.0.0.1", mock.base_port, Timing::immediate())
        .await
        .unwrap();

    let reply = session
        .launch_application("TermEth100GL2Traffic 1")
        .await
        .unwrap();
    session.close().await.unwrap();

    assert!(reply.contains("-221"));
    assert!(
        reply.as_str().ends_with("0, \"No error\"\nTermEth100GL2Traffic_101"),
        "read stopped early: {:?}",
        reply.as_str()
    );
    assert_eq!(
        mock.control_lines(),
        vec![
            "*REM".to_string(),
            ":SYSTem:APPLication:LAUNch TermEth100GL2Traffic 1 ;:SYSTem:ERRor?".to_string(),
        ]
    );
    assert!(!logs_contain(FAULT_MESSAGE));
}
