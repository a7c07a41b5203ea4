use std::collections::VecDeque;
use std::sync::Arc;

use async_lock::Mutex;
use log::{debug, error, warn};

use crate::transport::{ConnectionHandle, GattTransport};
use crate::types::WriteType;
use crate::Result;

/// A GATT request waiting for its turn on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GattOperation {
    ReadCharacteristic {
        handle: u16,
    },
    WriteCharacteristic {
        handle: u16,
        value: Vec<u8>,
        write_type: WriteType,
    },
    /// Write to a CCCD issued by `set_notify_value`.
    WriteDescriptor {
        handle: u16,
        value: Vec<u8>,
    },
    ReadDescriptor {
        handle: u16,
    },
    /// Write to any descriptor requested by the application.
    WriteDescriptorValue {
        handle: u16,
        value: Vec<u8>,
    },
}

impl GattOperation {
    fn has_completion_callback(&self) -> bool {
        !matches!(
            self,
            GattOperation::WriteCharacteristic {
                write_type: WriteType::WithoutResponse,
                ..
            }
        )
    }
}

type RejectionHandler = Box<dyn Fn(GattOperation, crate::Error) + Send + Sync>;

/// Serializes GATT operations on one connection: the host stack accepts a single
/// outstanding operation per connection, so the next one is issued only after the
/// completion callback of the previous one.
///
/// Writes without response have no completion callback and are followed immediately
/// by the next operation. Operations the stack refuses synchronously are handed to the
/// rejection handler and skipped. No operation times out.
pub(crate) struct OperationQueue {
    transport: Arc<dyn GattTransport>,
    gatt: ConnectionHandle,
    state: Mutex<QueueState>,
    on_rejected: RejectionHandler,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<GattOperation>,
    in_flight: Option<GattOperation>,
    // set from the moment an operation is dequeued until the queue drains
    busy: bool,
}

impl OperationQueue {
    pub fn new(
        transport: Arc<dyn GattTransport>,
        gatt: ConnectionHandle,
        on_rejected: impl Fn(GattOperation, crate::Error) + Send + Sync + 'static,
    ) -> Self {
        Self {
            transport,
            gatt,
            state: Mutex::new(QueueState::default()),
            on_rejected: Box::new(on_rejected),
        }
    }

    pub fn gatt(&self) -> &ConnectionHandle {
        &self.gatt
    }

    /// Appends the operation and starts it if the connection is idle.
    pub fn enqueue(&self, op: GattOperation) {
        debug!("queueing {op:?} on {}", self.gatt);
        let mut state = self.state.lock_blocking();
        state.pending.push_back(op);
        if state.busy {
            return;
        }
        state.busy = true;
        drop(state);
        self.drive();
    }

    /// The operation currently waiting for its completion callback.
    pub fn in_flight(&self) -> Option<GattOperation> {
        self.state.lock_blocking().in_flight.clone()
    }

    /// Signals the completion of the in-flight operation and starts the next one.
    /// Returns the finished operation, or `None` if nothing was in flight.
    pub fn on_operation_complete(&self) -> Option<GattOperation> {
        let finished = {
            let mut state = self.state.lock_blocking();
            if !state.busy {
                warn!("completion signal on idle connection {}, ignored", self.gatt);
                return None;
            }
            state.in_flight.take()
        };
        debug!("operation complete on {}, processing next", self.gatt);
        self.drive();
        finished
    }

    /// True when no operation is in flight or waiting.
    pub fn is_idle(&self) -> bool {
        !self.state.lock_blocking().busy
    }

    /// Drops every waiting operation; a completion arriving later is ignored.
    pub fn clear(&self) {
        let mut state = self.state.lock_blocking();
        if !state.pending.is_empty() {
            debug!("dropping {} queued operations on {}", state.pending.len(), self.gatt);
        }
        *state = QueueState::default();
    }

    fn drive(&self) {
        loop {
            let op = {
                let mut state = self.state.lock_blocking();
                match state.pending.pop_front() {
                    Some(op) => {
                        state.in_flight = Some(op.clone());
                        op
                    }
                    None => {
                        state.in_flight = None;
                        state.busy = false;
                        return;
                    }
                }
            };
            match self.execute(&op) {
                Ok(()) if op.has_completion_callback() => return,
                Ok(()) => {
                    debug!("{op:?} has no completion callback, continuing");
                }
                Err(e) => {
                    error!("{op:?} failed to start on {}: {e}", self.gatt);
                    (self.on_rejected)(op, e);
                }
            }
        }
    }

    fn execute(&self, op: &GattOperation) -> Result<()> {
        debug!("executing {op:?} on {}", self.gatt);
        let gatt = &self.gatt;
        match op {
            GattOperation::ReadCharacteristic { handle } => {
                self.transport.read_characteristic(gatt, *handle)
            }
            GattOperation::WriteCharacteristic {
                handle,
                value,
                write_type,
            } => self
                .transport
                .write_characteristic(gatt, *handle, value, *write_type),
            GattOperation::WriteDescriptor { handle, value }
            | GattOperation::WriteDescriptorValue { handle, value } => {
                self.transport.write_descriptor(gatt, *handle, value)
            }
            GattOperation::ReadDescriptor { handle } => self.transport.read_descriptor(gatt, *handle),
        }
    }
}
