//! I2C register access on the plugged transceiver.
//!
//! One byte is fetched in four steps: page select, address select, trigger,
//! then a read of the latched data register.
//!
//! ```text
//! :SENSE:EXPERT:I2C:PEEK:PAGESEL 32
//! :SENSE:EXPERT:I2C:PEEK:REGADDR 182 ;:SYSTem:ERRor?
//! :SENSE:EXPERT:I2C:PEEK:Trigger ;:SYSTem:ERRor?
//! :SENSe:DATA? :SENSE:EXPERT:I2C:PEEK:REGDATA        -> "\n203"
//! ```
//!
//! The first three are written back to back without reading. Their
//! acknowledgements are drained (and classified) before the data read so they
//! cannot be mistaken for the register value.

use crate::ber::BerValue;
use crate::error::{AppResult, MpaError};
use crate::protocol::{classify, Command, Scpi};
use crate::session::{Session, Transaction};
use crate::transport::Transport;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use tracing::{debug, info};

/// Number of bytes in one page dump.
pub const PAGE_SPAN: usize = 128;

const BYTES_PER_ROW: usize = 16;

/// A half page of the transceiver's register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterPage {
    /// Lower memory: page 0, addresses 0-127.
    Base,
    /// Upper memory of page `n`: addresses 128-255.
    Upper(u8),
}

impl RegisterPage {
    /// Value written with the page-select command.
    pub const fn page_number(self) -> u8 {
        match self {
            RegisterPage::Base => 0,
            RegisterPage::Upper(page) => page,
        }
    }

    /// First register address of this half page.
    pub const fn first_address(self) -> u8 {
        match self {
            RegisterPage::Base => 0,
            RegisterPage::Upper(_) => 128,
        }
    }

    /// All addresses covered, in order.
    pub const fn addresses(self) -> RangeInclusive<u8> {
        match self {
            RegisterPage::Base => 0..=127,
            RegisterPage::Upper(_) => 128..=255,
        }
    }
}

impl FromStr for RegisterPage {
    type Err = MpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("base") || trimmed.eq_ignore_ascii_case("basepage") {
            return Ok(RegisterPage::Base);
        }
        trimmed.parse::<u8>().map(RegisterPage::Upper).map_err(|_| {
            MpaError::InvalidArgument(format!(
                "Expected 'base' or a page number 0-255, got '{s}'"
            ))
        })
    }
}

impl fmt::Display for RegisterPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterPage::Base => f.write_str("Base page"),
            RegisterPage::Upper(page) => write!(f, "Page {page}"),
        }
    }
}

/// The 128 bytes of one half page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDump {
    page: RegisterPage,
    bytes: Vec<u8>,
}

impl PageDump {
    /// Wrap bytes read from `page`; there must be exactly [`PAGE_SPAN`] of them.
    pub fn new(page: RegisterPage, bytes: Vec<u8>) -> AppResult<Self> {
        if bytes.len() != PAGE_SPAN {
            return Err(MpaError::InvalidArgument(format!(
                "A page dump holds {PAGE_SPAN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self { page, bytes })
    }

    /// The page dumped.
    pub fn page(&self) -> RegisterPage {
        self.page
    }

    /// Bytes in address order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte at an absolute register address, if it is on this half page.
    pub fn get(&self, address: u8) -> Option<u8> {
        let offset = address.checked_sub(self.page.first_address())?;
        self.bytes.get(usize::from(offset)).copied()
    }
}

impl fmt::Display for PageDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.page)?;
        write!(f, "   ")?;
        for column in 0..BYTES_PER_ROW {
            write!(f, " {column:02X}")?;
        }
        writeln!(f)?;

        let first = usize::from(self.page.first_address());
        for (row, chunk) in self.bytes.chunks(BYTES_PER_ROW).enumerate() {
            write!(f, "{:02X}:", first + row * BYTES_PER_ROW)?;
            for byte in chunk {
                write!(f, " {byte:02x}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Transceiver vendors with a known pre-FEC BER location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreFecVendor {
    /// Page 32, bytes 182-183.
    Inphi,
    /// Page 32, bytes 158-159.
    Eopto,
}

impl PreFecVendor {
    /// Page and high-byte address of the BER word.
    pub const fn location(self) -> (u8, u8) {
        match self {
            PreFecVendor::Inphi => (32, 182),
            PreFecVendor::Eopto => (32, 158),
        }
    }
}

impl FromStr for PreFecVendor {
    type Err = MpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inphi" => Ok(PreFecVendor::Inphi),
            "eopto" => Ok(PreFecVendor::Eopto),
            other => Err(MpaError::InvalidArgument(format!(
                "Unknown pre-FEC vendor '{other}' (expected inphi or eopto)"
            ))),
        }
    }
}

/// Two lowercase hex digits, as register bytes are usually written.
pub fn hex_byte(byte: u8) -> String {
    format!("{byte:02x}")
}

impl<T: Transport> Session<T> {
    /// Read one register byte.
    pub async fn peek_byte(&mut self, page: u8, address: u8) -> AppResult<u8> {
        let window = self.timing().peek_timeout;

        self.send(&Command::new(Scpi::PeekPageSelect).with_argument(page))
            .await?;
        self.send(
            &Command::new(Scpi::PeekRegisterAddress)
                .with_argument(address)
                .with_status_query(),
        )
        .await?;
        self.send(&Command::new(Scpi::PeekTrigger).with_status_query())
            .await?;

        let acknowledgements = self.drain(window).await?;
        classify(&acknowledgements, "read_i2c");

        let reply = self
            .transact(&Transaction::silent("read_i2c", Scpi::PeekRegisterData).with_timeout(window))
            .await?;

        let byte = reply
            .first_value()
            .and_then(|value| value.parse::<u8>().ok())
            .ok_or_else(|| MpaError::UnexpectedReply {
                operation: "read_i2c",
                reply: reply.as_str().to_string(),
            })?;
        debug!(page, address, value = %hex_byte(byte), "Register read");
        Ok(byte)
    }

    /// Read all 128 bytes of a half page, one peek per address.
    pub async fn dump_page(&mut self, page: RegisterPage) -> AppResult<PageDump> {
        let mut bytes = Vec::with_capacity(PAGE_SPAN);
        for address in page.addresses() {
            bytes.push(self.peek_byte(page.page_number(), address).await?);
        }
        info!(%page, "Page dump complete");
        PageDump::new(page, bytes)
    }

    /// Decode the BER word stored at `high_address` and the byte after it.
    pub async fn read_ber(&mut self, page: u8, high_address: u8) -> AppResult<BerValue> {
        let low_address = high_address.checked_add(1).ok_or_else(|| {
            MpaError::InvalidArgument(format!(
                "BER word at address {high_address} runs past the page"
            ))
        })?;
        let high = self.peek_byte(page, high_address).await?;
        let low = self.peek_byte(page, low_address).await?;
        Ok(BerValue::from_bytes(high, low))
    }

    /// Pre-FEC BER at the vendor's register location.
    pub async fn read_pre_fec_ber(&mut self, vendor: PreFecVendor) -> AppResult<BerValue> {
        let (page, address) = vendor.location();
        let ber = self.read_ber(page, address).await?;
        info!(?vendor, ber = %ber, "Pre-FEC BER");
        Ok(ber)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::transport::MockTransport;
    use std::sync::{Arc, Mutex};

    /// Register map where every byte equals its address, page ignored.
    fn register_mock() -> MockTransport {
        let selected = Arc::new(Mutex::new(0u8));
        MockTransport::new(move |line: &str| {
            let mut address = selected.lock().unwrap();
            if let Some(rest) = line.strip_prefix(":SENSE:EXPERT:I2C:PEEK:REGADDR ") {
                *address = rest.split(' ').next().unwrap().parse().unwrap();
                Some("0, \"No error\"\n".to_string())
            } else if line.starts_with(":SENSE:EXPERT:I2C:PEEK:Trigger") {
                Some("0, \"No error\"\n".to_string())
            } else if line == ":SENSe:DATA? :SENSE:EXPERT:I2C:PEEK:REGDATA" {
                Some(format!("\n{}\n", *address))
            } else {
                None
            }
        })
    }

    #[tokio::test]
    async fn peek_sends_four_commands_in_order() {
        let mut session =
            Session::from_transport(register_mock(), "bert", 8006, Timing::immediate());
        assert_eq!(session.peek_byte(32, 182).await.unwrap(), 182);
        assert_eq!(
            session.transport().sent_lines(),
            vec![
                ":SENSE:EXPERT:I2C:PEEK:PAGESEL 32".to_string(),
                ":SENSE:EXPERT:I2C:PEEK:REGADDR 182 ;:SYSTem:ERRor?".to_string(),
                ":SENSE:EXPERT:I2C:PEEK:Trigger ;:SYSTem:ERRor?".to_string(),
                ":SENSe:DATA? :SENSE:EXPERT:I2C:PEEK:REGDATA".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn non_numeric_register_data_is_unexpected() {
        let transport = MockTransport::new(|line: &str| {
            line.ends_with("REGDATA").then(|| "\n9.91e+37\n".to_string())
        });
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        assert!(matches!(
            session.peek_byte(0, 0).await,
            Err(MpaError::UnexpectedReply { operation: "read_i2c", .. })
        ));
    }

    #[tokio::test]
    async fn upper_page_dump_covers_128_to_255() {
        let mut session =
            Session::from_transport(register_mock(), "bert", 8006, Timing::immediate());
        let dump = session.dump_page(RegisterPage::Upper(3)).await.unwrap();
        assert_eq!(dump.bytes().len(), PAGE_SPAN);
        assert_eq!(dump.get(128), Some(128));
        assert_eq!(dump.get(255), Some(255));
        assert_eq!(dump.get(127), None);
    }

    #[test]
    fn dump_renders_hex_grid() {
        let bytes: Vec<u8> = (0..=127).collect();
        let dump = PageDump::new(RegisterPage::Base, bytes).unwrap();
        let text = dump.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Base page:");
        assert_eq!(
            lines[1],
            "    00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F"
        );
        assert!(lines[2].starts_with("00: 00 01 02"));
        assert!(lines[9].starts_with("70: 70 71"));
        assert!(lines[9].ends_with("7f"));
        assert_eq!(lines.len(), 10);
    }

    #[test]
    fn upper_dump_rows_start_at_80() {
        let dump = PageDump::new(RegisterPage::Upper(32), vec![0xab; PAGE_SPAN]).unwrap();
        let text = dump.to_string();
        let rows: Vec<&str> = text.lines().skip(2).collect();
        assert!(rows[0].starts_with("80: ab"));
        assert!(rows[7].starts_with("F0: ab"));
    }

    #[test]
    fn page_parsing() {
        assert_eq!("base".parse::<RegisterPage>().unwrap(), RegisterPage::Base);
        assert_eq!("BasePage".parse::<RegisterPage>().unwrap(), RegisterPage::Base);
        assert_eq!("32".parse::<RegisterPage>().unwrap(), RegisterPage::Upper(32));
        assert!("256".parse::<RegisterPage>().is_err());
    }

    #[test]
    fn hex_byte_is_zero_padded() {
        assert_eq!(hex_byte(0), "00");
        assert_eq!(hex_byte(0x0b), "0b");
        assert_eq!(hex_byte(0xcb), "cb");
    }
}
