//! Collection of response data sent by the nodes.

use crate::checksum::Accumulator;
use crate::event::Event;
use crate::types::Address;

/// Response data of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBuffer {
    /// Response of a unicast or non-batch message.
    Single(Vec<u8>),
    /// One section per node, indexed by node.
    Batch(Vec<Vec<u8>>),
}

impl ResponseBuffer {
    /// Total number of response bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Single(data) => data.len(),
            Self::Batch(nodes) => nodes.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Response section of a node. For non-batch responses the only
    /// section is at index 0.
    pub fn node(&self, index: usize) -> Option<&[u8]> {
        match self {
            Self::Single(data) if index == 0 => Some(data),
            Self::Single(_) => None,
            Self::Batch(nodes) => nodes.get(index).map(Vec::as_slice),
        }
    }
}

/// Collects inbound bytes into a [`ResponseBuffer`] and keeps track of
/// how much of the response is still missing.
#[derive(Debug)]
pub(crate) struct Collector {
    destination: Address,
    per_node_length: usize,
    total: usize,
    received: usize,
    buffer: ResponseBuffer,
}

impl Collector {
    pub fn new(destination: Address, per_node_length: u8, node_count: u8, batch: bool) -> Self {
        let per_node_length = usize::from(per_node_length);
        let (total, buffer) = if batch {
            let nodes = usize::from(node_count);
            (
                per_node_length * nodes,
                ResponseBuffer::Batch(vec![Vec::with_capacity(per_node_length); nodes]),
            )
        } else {
            (
                per_node_length,
                ResponseBuffer::Single(Vec::with_capacity(per_node_length)),
            )
        };
        Self {
            destination,
            per_node_length,
            total,
            received: 0,
            buffer,
        }
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.total
    }

    /// Index of the node whose section is being filled. `None` once every
    /// section is full, or for non-batch responses.
    pub fn active_node_index(&self) -> Option<usize> {
        match &self.buffer {
            ResponseBuffer::Batch(nodes) => {
                nodes.iter().position(|n| n.len() < self.per_node_length)
            }
            ResponseBuffer::Single(_) => None,
        }
    }

    /// Append inbound bytes to the response. Bytes past the end of the
    /// response are dropped. Returns the number of bytes accepted.
    pub fn push(&mut self, raw: &[u8], crc: &mut Accumulator, mut emit: impl FnMut(Event)) -> usize {
        let per_node_length = self.per_node_length;
        match &mut self.buffer {
            ResponseBuffer::Single(data) => {
                let remaining = self.total.saturating_sub(data.len());
                let accepted = &raw[..raw.len().min(remaining)];
                for &value in accepted {
                    data.push(value);
                    emit(Event::ResponseByte {
                        node: self.destination,
                        value,
                    });
                }
                crc.update(accepted);
                self.received += accepted.len();
                accepted.len()
            }
            ResponseBuffer::Batch(nodes) => {
                let mut accepted = 0;
                for &value in raw {
                    let index = match nodes.iter().position(|n| n.len() < per_node_length) {
                        Some(index) => index,
                        None => break,
                    };
                    let node = &mut nodes[index];
                    node.push(value);
                    if node.len() == per_node_length {
                        emit(Event::NodeResponse {
                            node: index,
                            data: node.clone(),
                        });
                    }
                    accepted += 1;
                }
                crc.update(&raw[..accepted]);
                self.received += accepted;
                accepted
            }
        }
    }

    /// The part of `default` still missing from the pending section: the
    /// active node in batch mode, otherwise the whole response.
    pub fn missing_fill(&self, default: &[u8]) -> Vec<u8> {
        let current = match &self.buffer {
            ResponseBuffer::Single(data) => Some(data.len()),
            ResponseBuffer::Batch(nodes) => self.active_node_index().map(|i| nodes[i].len()),
        };
        match current {
            Some(len) if len < default.len() => default[len..].to_vec(),
            _ => Vec::new(),
        }
    }

    pub fn into_buffer(self) -> ResponseBuffer {
        self.buffer
    }
}
