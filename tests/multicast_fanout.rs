//! Two shell servers on the local-socket transport, each with a control
//! session registered into one multicast group, fanned a single command
//! out to both — the scenario `pshellControlDemo`'s multicast mode
//! exercises interactively.

mod support;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use ntest::timeout;
use pshell::{
    control::{self, multicast},
    server::{ShellServerBuilder, StartMode, Transport},
};

use crate::support::wait_until;

fn start_counting_server(name: &str, counter: Arc<AtomicUsize>, last_argv: Arc<Mutex<Vec<String>>>) {
    let server = ShellServerBuilder::new(name)
        .add_command(
            "trace",
            Box::new(move |argv, _ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                *last_argv.lock().unwrap() = argv.iter().map(|s| s.to_string()).collect();
            }),
            "toggles tracing",
            None,
            1,
            1,
            false,
        )
        .unwrap()
        .build();
    server.start(Transport::UnixDgram, StartMode::NonBlocking).unwrap();
}

fn connect_with_retry(control_name: &str, server_name: &str) -> u16 {
    let mut sid = None;
    wait_until(|| match control::connect(control_name, server_name, 0, 500) {
        Ok(s) => {
            sid = Some(s);
            Ok(true)
        }
        Err(_) => Ok(false),
    })
    .expect("server never came up");
    sid.unwrap()
}

#[test]
#[timeout(10000)]
fn multicast_reaches_every_member_exactly_once() {
    let server_a = support::unique_name("pshellMcastA");
    let server_b = support::unique_name("pshellMcastB");

    let counter_a = Arc::new(AtomicUsize::new(0));
    let counter_b = Arc::new(AtomicUsize::new(0));
    let argv_a = Arc::new(Mutex::new(Vec::new()));
    let argv_b = Arc::new(Mutex::new(Vec::new()));

    start_counting_server(&server_a, counter_a.clone(), argv_a.clone());
    start_counting_server(&server_b, counter_b.clone(), argv_b.clone());

    let name_a = support::unique_name("mcastCtlA");
    let name_b = support::unique_name("mcastCtlB");
    let sid_a = connect_with_retry(&name_a, &server_a);
    let sid_b = connect_with_retry(&name_b, &server_b);

    let keyword = support::unique_name("traceGroup");
    multicast::add_multicast(&keyword, &format!("{name_a},{name_b}"));
    multicast::send_multicast(&format!("{keyword} on"));

    wait_until(|| Ok(counter_a.load(Ordering::SeqCst) == 1 && counter_b.load(Ordering::SeqCst) == 1))
        .expect("both servers should have received the multicast command");

    assert_eq!(*argv_a.lock().unwrap(), vec!["on".to_string()]);
    assert_eq!(*argv_b.lock().unwrap(), vec!["on".to_string()]);

    control::disconnect(sid_a);
    control::disconnect(sid_b);
}

#[test]
#[timeout(10000)]
fn csv_member_with_no_live_session_is_skipped_not_fatal() {
    let server_a = support::unique_name("pshellMcastSolo");
    let counter_a = Arc::new(AtomicUsize::new(0));
    let argv_a = Arc::new(Mutex::new(Vec::new()));
    start_counting_server(&server_a, counter_a.clone(), argv_a.clone());

    let name_a = support::unique_name("mcastCtlSolo");
    let sid_a = connect_with_retry(&name_a, &server_a);

    let keyword = support::unique_name("soloGroup");
    multicast::add_multicast(&keyword, &format!("{name_a},noSuchControlNameAnywhere"));
    multicast::send_multicast(&format!("{keyword} off"));

    wait_until(|| Ok(counter_a.load(Ordering::SeqCst) == 1)).unwrap();

    // a bit of slack to make sure the unknown name didn't somehow also fire
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(counter_a.load(Ordering::SeqCst), 1);

    control::disconnect(sid_a);
}
