#![allow(dead_code)]
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::process::{Child, Command as StdCommand, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::cargo::{self};

/// Test helper that starts/stops an echo server process for integration tests.
pub struct EchoServerTest {
    child: Child,
    addr: String,
}

/// Choose a free local port to avoid conflicts across tests/machines.
pub fn free_local_addr() -> anyhow::Result<String> {
    let l = TcpListener::bind("127.0.0.1:0")?;
    let port = l.local_addr()?.port();
    drop(l);
    Ok(format!("127.0.0.1:{port}"))
}

impl EchoServerTest {
    /// Start the server on an ephemeral localhost port with the given buffer size.
    pub fn start(buffer_size: usize) -> anyhow::Result<Self> {
        let addr = free_local_addr()?;

        let bin_path = cargo::cargo_bin!("echo-aio");
        let mut child = StdCommand::new(bin_path)
            .arg("--mode")
            .arg("server")
            .arg("--address")
            .arg(&addr)
            .arg("--buffer-size")
            .arg(buffer_size.to_string())
            .arg("--workers")
            .arg("2")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        // Wait until the server starts accepting connections on the chosen port.
        // Each probe is itself an accepted connection that closes without data.
        let start = Instant::now();
        loop {
            match TcpStream::connect(&addr) {
                Ok(_) => break,
                Err(_) => {
                    if start.elapsed() > Duration::from_secs(5) {
                        let _ = child.kill();
                        let _ = child.wait();
                        anyhow::bail!(
                            "Timed out waiting for server to accept connections on {addr}"
                        );
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }

        Ok(Self { child, addr })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Open a new TCP connection to the running server.
    pub fn connect(&self) -> std::io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)?;
        stream.set_read_timeout(Some(Duration::from_secs(3)))?;
        Ok(stream)
    }

    /// Send one message on a fresh connection and read the reply until the server closes it.
    pub fn echo(&self, message: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut stream = self.connect()?;
        stream.write_all(message)?;
        stream.flush()?;

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply)?;
        Ok(reply)
    }
}

impl EchoServerTest {
    /// Deliver a signal (e.g. "TERM", "INT") to the server process.
    #[cfg(unix)]
    pub fn send_signal(&self, name: &str) -> anyhow::Result<()> {
        let status = StdCommand::new("kill")
            .arg(format!("-{name}"))
            .arg(self.child.id().to_string())
            .status()?;
        anyhow::ensure!(status.success(), "kill -{name} failed with {status}");
        Ok(())
    }

    /// Wait for the server process to exit on its own.
    pub fn wait_for_exit(&mut self, timeout: Duration) -> anyhow::Result<ExitStatus> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if start.elapsed() > timeout {
                anyhow::bail!("Server did not exit within {timeout:?}");
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for EchoServerTest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Half-close the write side so the peer sees EOF.
pub fn finish_writing(stream: &TcpStream) {
    let _ = stream.shutdown(Shutdown::Write);
}
