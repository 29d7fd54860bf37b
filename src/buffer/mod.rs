use crate::record::PacketRecord;

/// Ordered, append-only holding area for validated records awaiting dispatch.
///
/// Between flushes the buffer only grows. `drain` swaps the contents out in a
/// single step, so a fresh empty buffer is already in place before the drained
/// batch goes anywhere near the network — concurrent ingestion lands in the
/// new buffer instead of racing the in-flight batch.
#[derive(Debug, Default)]
pub struct RecordBuffer {
    records: Vec<PacketRecord>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record, preserving arrival order. Never fails.
    pub fn append(&mut self, record: PacketRecord) {
        self.records.push(record);
    }

    /// Take the current contents, leaving the buffer empty.
    /// The caller owns the returned batch thereafter.
    pub fn drain(&mut self) -> Vec<PacketRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests;
