//! Byte stream channels
//!
//! The session talks to the bridge through [`CommunicationChannel`], so a
//! USB-serial adapter, a network serial server or an in-memory fake can all
//! carry the protocol.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Duplex byte stream the session owns
pub trait CommunicationChannel: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard anything buffered on the receive side
    fn clear_input_buffer(&mut self) -> io::Result<()>;

    /// Discard anything not yet transmitted
    fn clear_output_buffer(&mut self) -> io::Result<()>;

    /// Number of bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> io::Result<u32>;
}

fn other_error(e: serialport::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Serial port channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    /// Wrap an opened and configured port
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Name of the underlying device, if the driver knows it
    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(other_error)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(other_error)
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Output)
            .map_err(other_error)
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.port.bytes_to_read().map_err(other_error)
    }
}

/// TCP channel for bridges exposed through a network serial server
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    /// Wrap a connected stream, disabling Nagle
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Connect to `addr` with the given connect timeout
    pub fn connect(addr: &std::net::SocketAddr, timeout: Duration) -> io::Result<Self> {
        Self::new(TcpStream::connect_timeout(addr, timeout)?)
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // No kernel call for this on sockets; read until the socket would block
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 1024];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }

    fn clear_output_buffer(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 2048];
        let result = self.stream.peek(&mut buf);
        self.stream.set_nonblocking(false)?;

        match result {
            Ok(n) => Ok(n as u32),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_tcp_channel_bytes_to_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut channel = TcpChannel::connect(&addr, Duration::from_secs(1)).unwrap();
        let (mut peer, _) = listener.accept().unwrap();

        assert_eq!(channel.bytes_to_read().unwrap(), 0);

        peer.write_all(&[0xAB, 0xCD, 0x02]).unwrap();
        peer.flush().unwrap();

        let start = std::time::Instant::now();
        while channel.bytes_to_read().unwrap() < 3 {
            assert!(start.elapsed() < Duration::from_secs(2), "data never arrived");
            std::thread::sleep(Duration::from_millis(5));
        }

        channel.clear_input_buffer().unwrap();
        assert_eq!(channel.bytes_to_read().unwrap(), 0);
    }
}
