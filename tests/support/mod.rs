// This module is shared by every file under `tests/`, each of which is
// compiled into its own test binary. Not all binaries use everything here.
#![allow(dead_code)]

use std::{net::UdpSocket, time};

use anyhow::anyhow;
use rand::{distributions::Alphanumeric, Rng};

/// A name unique enough to avoid colliding with another test's UNIX
/// datagram socket under the fixed `/tmp` server directory, or another
/// test's control-session name, when `cargo test` runs files in parallel
/// threads of the same process.
pub fn unique_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    format!("{prefix}{suffix}")
}

/// Bind an ephemeral UDP port and hand back just the port number, for a
/// test that wants a free port to bind its own UDP or TCP server to a
/// moment later. Racy in principle, fine for a single-machine test suite.
pub fn free_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

pub fn wait_until<P>(mut pred: P) -> anyhow::Result<()>
where
    P: FnMut() -> anyhow::Result<bool>,
{
    let mut sleep_dur = time::Duration::from_millis(5);
    for _ in 0..12 {
        if pred()? {
            return Ok(());
        } else {
            std::thread::sleep(sleep_dur);
            sleep_dur *= 2;
        }
    }

    Err(anyhow!("pred never became true"))
}
