//! Port to the transport layer. The core never frames bytes for a bus itself; it reads, writes and
//! erases ECU memory through [`EcuMemory`].

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::constants::ERASED_BYTE;
use crate::checksum::check_bounds;
use crate::gate::HardwareEvidence;
use crate::Result;

/// Memory of a single ECU as exposed by a transport (UDS, KWP2000, bench simulator, ...).
/// Implementations report failures, including timeouts, as [`crate::Error::Transport`].
#[async_trait]
pub trait EcuMemory: Send + Sync {
    /// Size of the addressable flash in bytes.
    fn size(&self) -> usize;

    /// Evidence that a physical ECU is attached. `None` for simulators.
    fn hardware_evidence(&self) -> Option<HardwareEvidence>;

    async fn read(&self, address: usize, length: usize) -> Result<Vec<u8>>;
    async fn write(&self, address: usize, data: &[u8]) -> Result<()>;
    async fn erase(&self, address: usize, length: usize) -> Result<()>;
}

/// In-memory flash. Erased cells read as `0xFF`.
#[derive(Debug)]
pub struct MemoryEcu {
    size: usize,
    data: RwLock<Vec<u8>>,
    evidence: Option<HardwareEvidence>,
}

impl MemoryEcu {
    /// Blank (erased) flash of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_image(vec![ERASED_BYTE; size])
    }

    pub fn from_image(image: Vec<u8>) -> Self {
        Self {
            size: image.len(),
            data: RwLock::new(image),
            evidence: None,
        }
    }

    /// Report the memory as physical hardware, e.g. a bench ECU behind a passthrough adapter.
    pub fn attested(mut self, source: impl Into<String>) -> Self {
        self.evidence = Some(HardwareEvidence::new(source));
        self
    }

    pub async fn snapshot(&self) -> Vec<u8> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl EcuMemory for MemoryEcu {
    fn size(&self) -> usize {
        self.size
    }

    fn hardware_evidence(&self) -> Option<HardwareEvidence> {
        self.evidence.clone()
    }

    async fn read(&self, address: usize, length: usize) -> Result<Vec<u8>> {
        let data = self.data.read().await;
        let end = check_bounds(address, length, data.len())?;
        Ok(data[address..end].to_vec())
    }

    async fn write(&self, address: usize, bytes: &[u8]) -> Result<()> {
        let mut data = self.data.write().await;
        let end = check_bounds(address, bytes.len(), data.len())?;
        debug!("MemoryEcu write 0x{:x}..0x{:x}", address, end);
        data[address..end].copy_from_slice(bytes);
        Ok(())
    }

    async fn erase(&self, address: usize, length: usize) -> Result<()> {
        let mut data = self.data.write().await;
        let end = check_bounds(address, length, data.len())?;
        debug!("MemoryEcu erase 0x{:x}..0x{:x}", address, end);
        data[address..end].fill(ERASED_BYTE);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn read_write_erase() {
        let ecu = MemoryEcu::new(16);
        assert_eq!(ecu.size(), 16);
        assert_eq!(ecu.read(0, 4).await.unwrap(), vec![0xff; 4]);

        ecu.write(2, &[1, 2, 3]).await.unwrap();
        assert_eq!(ecu.read(0, 6).await.unwrap(), vec![0xff, 0xff, 1, 2, 3, 0xff]);

        ecu.erase(0, 8).await.unwrap();
        assert_eq!(ecu.snapshot().await, vec![0xff; 16]);
    }

    #[tokio::test]
    async fn out_of_bounds() {
        let ecu = MemoryEcu::new(16);
        assert!(matches!(ecu.write(15, &[1, 2]).await, Err(Error::OutOfBounds { .. })));
        assert!(matches!(ecu.read(8, 9).await, Err(Error::OutOfBounds { .. })));
        assert!(matches!(ecu.erase(usize::MAX, 1).await, Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn attested_memory_reports_evidence() {
        assert!(MemoryEcu::new(1).hardware_evidence().is_none());
        let ecu = MemoryEcu::new(1).attested("j2534 bench");
        assert_eq!(ecu.hardware_evidence().unwrap().source(), "j2534 bench");
    }
}
