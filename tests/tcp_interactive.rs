//! Drives the TCP transport the way an interactive `telnet` client would:
//! raw line-oriented text over a socket, no [`pshell::control`] session
//! involved.

mod support;

use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    time::Duration,
};

use ntest::timeout;
use pshell::server::{ShellServerBuilder, StartMode, Transport};

use crate::support::{free_port, wait_until};

#[test]
#[timeout(10000)]
fn interactive_session_echoes_and_quits_on_command() {
    let port = free_port();
    let server = ShellServerBuilder::new(support::unique_name("pshellTcpDemo"))
        .add_command(
            "echo",
            Box::new(|argv, ctx| ctx.printf(format_args!("{}", argv.join(" ")))),
            "echoes its arguments back",
            None,
            0,
            20,
            false,
        )
        .unwrap()
        .build();
    server.start(Transport::Tcp { bind_addr: format!("127.0.0.1:{port}") }, StartMode::NonBlocking).unwrap();

    let mut client = None;
    wait_until(|| match TcpStream::connect(("127.0.0.1", port)) {
        Ok(s) => {
            client = Some(s);
            Ok(true)
        }
        Err(_) => Ok(false),
    })
    .expect("tcp listener never came up");
    let mut client = client.unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    write!(client, "echo hi from tcp\nquit\n").unwrap();
    client.flush().unwrap();

    let mut reader = BufReader::new(client);
    let mut lines = Vec::new();
    let mut line = String::new();
    while reader.read_line(&mut line).unwrap_or(0) > 0 {
        lines.push(std::mem::take(&mut line));
    }

    assert!(lines.iter().any(|l| l.contains("hi from tcp")));
}
