//! Fixed binary output frame and transport routing
//!
//! Every tick produces one fixed-size frame: begin sentinel, wraparound
//! counter, orientation triple, accelerometer triple (currently zero), end
//! sentinel, all little-endian. The consumer frames on the sentinels.
//! Neither transport buffers or retries; a dropped frame is superseded by
//! the next tick.

/// Frame size on the wire in bytes
pub const FRAME_SIZE: usize = 30;

/// Wireless service UUID the transport implementation must expose
pub const SERVICE_UUID: &str = "19b10000-e8f2-537e-4f6c-d104768a1214";

/// Notify characteristic UUID carrying the output frames
pub const CHARACTERISTIC_UUID: &str = "19b10001-e8f2-537e-4f6c-d104768a1214";

/// Advertised local name of the device
pub const LOCAL_NAME: &str = "Head Tracker";

/// Begin sentinel
pub const FRAME_BEGIN: u16 = 0xAAAA;

/// End sentinel
pub const FRAME_END: u16 = 0x5555;

/// Highest counter value emitted before wrapping back to 0
pub const COUNTER_LIMIT: u16 = 999;

/// One output frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputFrame {
    pub counter: u16,
    /// Remapped orientation triple, degrees
    pub orientation: [f32; 3],
    /// Linear acceleration triple, currently unpopulated
    pub acceleration: [f32; 3],
}

impl OutputFrame {
    /// Serialize to the wire layout
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0..2].copy_from_slice(&FRAME_BEGIN.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.counter.to_le_bytes());
        for (i, value) in self.orientation.iter().enumerate() {
            bytes[4 + i * 4..8 + i * 4].copy_from_slice(&value.to_le_bytes());
        }
        for (i, value) in self.acceleration.iter().enumerate() {
            bytes[16 + i * 4..20 + i * 4].copy_from_slice(&value.to_le_bytes());
        }
        bytes[28..30].copy_from_slice(&FRAME_END.to_le_bytes());
        bytes
    }
}

/// Builds frames with the monotonic wraparound counter
#[derive(Debug, Default)]
pub struct Framer {
    counter: u16,
}

impl Framer {
    pub fn new() -> Self {
        Self { counter: 0 }
    }

    /// Build the next frame for an orientation triple
    ///
    /// Counters are emitted 0, 1, ..., 999 and then wrap back to 0 - not to
    /// a power-of-two boundary.
    pub fn frame(&mut self, orientation: [f32; 3]) -> OutputFrame {
        let frame = OutputFrame {
            counter: self.counter,
            orientation,
            acceleration: [0.0; 3],
        };
        self.counter = if self.counter >= COUNTER_LIMIT {
            0
        } else {
            self.counter + 1
        };
        frame
    }
}

/// Transport send failures (never surfaced to the pipeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is not currently open
    Closed,
    /// The transport rejected the write
    Failed,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Failed => write!(f, "transport write failed"),
        }
    }
}

/// One delivery path for output frames
///
/// Implemented by the wireless notify characteristic and by the serial byte
/// stream.
pub trait Transport {
    /// Whether this transport can currently carry a frame
    fn is_open(&self) -> bool;

    /// Write one frame
    fn send(&mut self, bytes: &[u8; FRAME_SIZE]) -> Result<(), TransportError>;
}

/// Selects the delivery target per tick by connection state
///
/// A connected wireless central takes priority; otherwise an open serial
/// stream carries the frame; otherwise the frame is dropped. Send errors
/// are logged and swallowed.
pub struct FrameRouter<W: Transport, S: Transport> {
    wireless: W,
    serial: S,
}

impl<W: Transport, S: Transport> FrameRouter<W, S> {
    pub fn new(wireless: W, serial: S) -> Self {
        Self { wireless, serial }
    }

    pub fn wireless(&self) -> &W {
        &self.wireless
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Deliver one frame on whichever transport is active
    pub fn deliver(&mut self, frame: &OutputFrame) {
        let bytes = frame.to_bytes();
        if self.wireless.is_open() {
            if let Err(error) = self.wireless.send(&bytes) {
                log::debug!("wireless frame dropped: {error}");
            }
        } else if self.serial.is_open() {
            if let Err(error) = self.serial.send(&bytes) {
                log::debug!("serial frame dropped: {error}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let frame = OutputFrame {
            counter: 258,
            orientation: [90.0, -45.0, 10.0],
            acceleration: [0.0; 3],
        };
        let bytes = frame.to_bytes();

        assert_eq!(&bytes[0..2], &[0xAA, 0xAA]);
        assert_eq!(&bytes[2..4], &258u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &90.0f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &(-45.0f32).to_le_bytes());
        assert_eq!(&bytes[12..16], &10.0f32.to_le_bytes());
        assert_eq!(&bytes[16..28], &[0u8; 12]);
        assert_eq!(&bytes[28..30], &[0x55, 0x55]);
        assert_eq!(bytes.len(), FRAME_SIZE);
    }

    #[test]
    fn test_counter_wraps_after_999() {
        let mut framer = Framer::new();
        for expected in 0..=999u16 {
            assert_eq!(framer.frame([0.0; 3]).counter, expected);
        }
        // Frame 1001 restarts at 0, not 1000
        assert_eq!(framer.frame([0.0; 3]).counter, 0);
        assert_eq!(framer.frame([0.0; 3]).counter, 1);
    }

    /// Transport double counting sends
    struct FakeTransport {
        open: bool,
        sent: u32,
        fail: bool,
    }

    impl FakeTransport {
        fn new(open: bool) -> Self {
            Self {
                open,
                sent: 0,
                fail: false,
            }
        }
    }

    impl Transport for FakeTransport {
        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, _bytes: &[u8; FRAME_SIZE]) -> Result<(), TransportError> {
            self.sent += 1;
            if self.fail {
                Err(TransportError::Failed)
            } else {
                Ok(())
            }
        }
    }

    fn frame() -> OutputFrame {
        OutputFrame {
            counter: 0,
            orientation: [1.0, 2.0, 3.0],
            acceleration: [0.0; 3],
        }
    }

    #[test]
    fn test_router_prefers_wireless() {
        let mut router = FrameRouter::new(FakeTransport::new(true), FakeTransport::new(true));
        router.deliver(&frame());
        assert_eq!(router.wireless().sent, 1);
        assert_eq!(router.serial().sent, 0);
    }

    #[test]
    fn test_router_falls_back_to_serial() {
        let mut router = FrameRouter::new(FakeTransport::new(false), FakeTransport::new(true));
        router.deliver(&frame());
        assert_eq!(router.wireless().sent, 0);
        assert_eq!(router.serial().sent, 1);
    }

    #[test]
    fn test_router_drops_when_nothing_open() {
        let mut router = FrameRouter::new(FakeTransport::new(false), FakeTransport::new(false));
        router.deliver(&frame());
        assert_eq!(router.wireless().sent, 0);
        assert_eq!(router.serial().sent, 0);
    }

    #[test]
    fn test_router_swallows_send_errors() {
        let mut wireless = FakeTransport::new(true);
        wireless.fail = true;
        let mut router = FrameRouter::new(wireless, FakeTransport::new(true));
        // Must not panic or fall through to serial
        router.deliver(&frame());
        assert_eq!(router.serial().sent, 0);
    }
}
