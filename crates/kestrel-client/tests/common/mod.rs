//! In-process Kestrel stand-in speaking the memcache text protocol.
//!
//! Runs on its own thread and runtime so both the blocking and the async
//! client can be tested against it. Open reads are tracked per connection
//! and handed back to their queue when the connection ends.

#![allow(dead_code)]

use kestrel_client::Endpoint;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

pub const VERSION: &str = "2.4.1-fake";

#[derive(Default)]
struct State {
    queues: Mutex<BTreeMap<String, VecDeque<String>>>,
    shutdowns: AtomicUsize,
    connections: AtomicUsize,
}

pub struct FakeKestrel {
    addr: SocketAddr,
    state: Arc<State>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Route client logs to the test harness; `RUST_LOG=debug` shows the wire traffic
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_test_writer()
        .try_init();
}

impl FakeKestrel {
    pub fn start() -> Self {
        init_tracing();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(State::default());
        let (stop, stopped) = oneshot::channel();

        let server_state = state.clone();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let listener = TcpListener::from_std(listener).unwrap();
                tokio::select! {
                    _ = stopped => {}
                    _ = accept_loop(listener, server_state) => {}
                }
            });
        });

        FakeKestrel {
            addr,
            state,
            stop: Some(stop),
            thread: Some(thread),
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn push(&self, queue: &str, item: &str) {
        let mut queues = self.state.queues.lock().unwrap();
        queues
            .entry(queue.to_string())
            .or_default()
            .push_back(item.to_string());
    }

    pub fn items(&self, queue: &str) -> Vec<String> {
        let queues = self.state.queues.lock().unwrap();
        queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn shutdowns(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

impl Drop for FakeKestrel {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// An endpoint nothing listens on
pub fn dead_endpoint() -> Endpoint {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

/// Poll `check` until it holds or two seconds pass
pub fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

async fn accept_loop(listener: TcpListener, state: Arc<State>) {
    while let Ok((stream, _)) = listener.accept().await {
        state.connections.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(serve(stream, state.clone()));
    }
}

async fn serve(stream: TcpStream, state: Arc<State>) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut open: HashMap<String, String> = HashMap::new();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        let reply = match (parts[0], parts.get(1).copied()) {
            ("get", Some(key)) => match fetch(&state, &mut open, key) {
                Some(item) => format!("VALUE {} 0 {}\r\n{}\r\nEND\r\n", key, item.len(), item),
                None => "END\r\n".to_string(),
            },
            ("set", Some(key)) => {
                let Some(len) = parts.get(4).and_then(|n| n.parse::<usize>().ok()) else {
                    let _ = writer.write_all(b"CLIENT_ERROR bad data chunk\r\n").await;
                    continue;
                };
                let mut data = vec![0u8; len + 2];
                if reader.read_exact(&mut data).await.is_err() {
                    break;
                }
                let item = String::from_utf8_lossy(&data[..len]).into_owned();
                let mut queues = state.queues.lock().unwrap();
                queues.entry(key.to_string()).or_default().push_back(item);
                "STORED\r\n".to_string()
            }
            ("delete", Some(key)) => {
                let removed = state.queues.lock().unwrap().remove(key);
                match removed {
                    Some(_) => "DELETED\r\n".to_string(),
                    None => "NOT_FOUND\r\n".to_string(),
                }
            }
            ("flush_all", _) => {
                state.queues.lock().unwrap().clear();
                "OK\r\n".to_string()
            }
            ("FLUSH", Some(queue)) => {
                let mut queues = state.queues.lock().unwrap();
                if let Some(items) = queues.get_mut(queue) {
                    items.clear();
                }
                "OK\r\n".to_string()
            }
            ("RELOAD", _) => "OK\r\n".to_string(),
            ("VERSION", _) => format!("VERSION {}\r\n", VERSION),
            ("STATS", _) => stats(&state, &open),
            ("DUMP_STATS", _) => dump_stats(&state, &open),
            ("SHUTDOWN", _) => {
                state.shutdowns.fetch_add(1, Ordering::SeqCst);
                break;
            }
            _ => "ERROR\r\n".to_string(),
        };

        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }

    // Unacknowledged reads go back to the head of their queue
    let mut queues = state.queues.lock().unwrap();
    for (queue, item) in open {
        queues.entry(queue).or_default().push_front(item);
    }
}

fn fetch(state: &State, open: &mut HashMap<String, String>, key: &str) -> Option<String> {
    let mut parts = key.split('/');
    let name = parts.next().unwrap_or_default().to_string();
    let options: Vec<&str> = parts.filter(|o| !o.starts_with("t=")).collect();
    let has = |option: &str| options.contains(&option);

    let mut queues = state.queues.lock().unwrap();
    let queue = queues.entry(name.clone()).or_default();

    if has("abort") {
        if let Some(item) = open.remove(&name) {
            queue.push_front(item);
        }
        return None;
    }
    if has("close") {
        open.remove(&name);
    }
    if has("peek") {
        return queue.front().cloned();
    }
    if has("open") {
        let item = queue.pop_front()?;
        open.insert(name, item.clone());
        return Some(item);
    }
    if has("close") {
        return None;
    }
    queue.pop_front()
}

fn stats(state: &State, open: &HashMap<String, String>) -> String {
    let queues = state.queues.lock().unwrap();
    let total: usize = queues.values().map(VecDeque::len).sum();

    let mut out = String::new();
    out.push_str("STAT uptime 42\r\n");
    out.push_str(&format!("STAT version {}\r\n", VERSION));
    out.push_str(&format!("STAT curr_items {}\r\n", total));
    out.push_str(&format!("STAT open_transactions {}\r\n", open.len()));
    for (name, items) in queues.iter() {
        out.push_str(&format!("STAT queue_{}_items {}\r\n", name, items.len()));
    }
    out.push_str("END\r\n");
    out
}

fn dump_stats(state: &State, open: &HashMap<String, String>) -> String {
    let queues = state.queues.lock().unwrap();

    let mut out = String::new();
    for (name, items) in queues.iter() {
        let bytes: usize = items.iter().map(String::len).sum();
        out.push_str(&format!("queue '{}' {{\r\n", name));
        out.push_str(&format!("  items={}\r\n", items.len()));
        out.push_str(&format!("  bytes={}\r\n", bytes));
        out.push_str(&format!(
            "  open_transactions={}\r\n",
            usize::from(open.contains_key(name))
        ));
        out.push_str("}\r\n");
    }
    out.push_str("END\r\n");
    out
}
