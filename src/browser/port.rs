use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};

const FIRST_PORT: u16 = 9222;
const LAST_PORT: u16 = 65500;

static CDP_PORT_COUNTER: AtomicU16 = AtomicU16::new(FIRST_PORT);

/// Allocate the next CDP remote-debugging port.
/// Starts at 9222 and increments; wraps around at 65500.
pub fn allocate_cdp_port() -> u16 {
    let port = CDP_PORT_COUNTER.fetch_add(1, Ordering::SeqCst);
    if port > LAST_PORT {
        CDP_PORT_COUNTER.store(FIRST_PORT + 1, Ordering::SeqCst);
        return FIRST_PORT;
    }
    port
}

/// Allocate a port that nothing is currently listening on, giving up after
/// `attempts` candidates.
pub fn allocate_free_cdp_port(attempts: u16) -> Option<u16> {
    (0..attempts)
        .map(|_| allocate_cdp_port())
        .find(|port| TcpListener::bind(("127.0.0.1", *port)).is_ok())
}
