//! SNTP over the embassy-net UDP stack.
//!
//! [`SntpTimeSource::request_sync`] only hands the server name to
//! [`sntp_task`]; the answer lands in [`WALL_CLOCK`] whenever it arrives.

use core::cell::Cell;

use bringup_core::timesync::{TimeSource, civil_year_from_unix};
use defmt::{info, warn};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::Stack;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, WithTimeout};
use heapless::String;

const NTP_PORT: u16 = 123;
const LOCAL_PORT: u16 = 50_123;
const NTP_PACKET_LEN: usize = 48;
/// Seconds between 1900-01-01 and 1970-01-01.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

type ServerName = String<64>;

static REQUEST: Signal<CriticalSectionRawMutex, ServerName> = Signal::new();

/// Unix seconds at the instant of the last successful sync.
static WALL_CLOCK: Mutex<CriticalSectionRawMutex, Cell<Option<(u64, Instant)>>> =
    Mutex::new(Cell::new(None));

#[derive(Debug, defmt::Format)]
enum SntpError {
    Dns,
    Socket,
    Timeout,
    ShortReply,
}

/// Current Unix time, if SNTP ever answered.
pub fn unix_now() -> Option<u64> {
    WALL_CLOCK
        .lock(Cell::get)
        .map(|(secs, at)| secs + Instant::now().saturating_duration_since(at).as_secs())
}

pub struct SntpTimeSource;

impl TimeSource for SntpTimeSource {
    fn request_sync(&mut self, server: &str) {
        let mut name = ServerName::new();
        if name.push_str(server).is_err() {
            warn!("sntp server name too long");
            return;
        }
        REQUEST.signal(name);
    }

    fn current_year(&self) -> Option<i32> {
        unix_now().map(|secs| civil_year_from_unix(i64::try_from(secs).unwrap_or(i64::MAX)))
    }
}

#[embassy_executor::task]
pub async fn sntp_task(stack: Stack<'static>) -> ! {
    loop {
        let server = REQUEST.wait().await;
        match query(stack, &server).await {
            Ok(secs) => {
                WALL_CLOCK.lock(|cell| cell.set(Some((secs, Instant::now()))));
                info!("sntp: {=str} answered, unix {}", server.as_str(), secs);
            }
            Err(err) => warn!("sntp: {=str} failed: {}", server.as_str(), err),
        }
    }
}

async fn query(stack: Stack<'static>, server: &str) -> Result<u64, SntpError> {
    stack
        .wait_config_up()
        .with_timeout(QUERY_TIMEOUT)
        .await
        .map_err(|_| SntpError::Timeout)?;
    let addresses = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|_| SntpError::Dns)?;
    let address = *addresses.first().ok_or(SntpError::Dns)?;

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(LOCAL_PORT).map_err(|_| SntpError::Socket)?;

    // LI = 0, version 3, mode 3 (client).
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B;
    socket
        .send_to(&packet, (address, NTP_PORT))
        .await
        .map_err(|_| SntpError::Socket)?;

    let (len, _) = socket
        .recv_from(&mut packet)
        .with_timeout(QUERY_TIMEOUT)
        .await
        .map_err(|_| SntpError::Timeout)?
        .map_err(|_| SntpError::Socket)?;
    if len < NTP_PACKET_LEN {
        return Err(SntpError::ShortReply);
    }

    let transmit = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    Ok(u64::from(transmit).saturating_sub(NTP_UNIX_OFFSET))
}
