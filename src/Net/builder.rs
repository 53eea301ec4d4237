use std::sync::Arc;

use tracing::debug;

use crate::config::NetConfig;
use crate::error::NetError;
use crate::Core::NetMetrics;
use crate::Net::collaborators::{
    BufferPool, DropBufferPool, FlowControl, MessageDirectory, NoCorrelator, NoFlowControl,
    ResponseCorrelator,
};
use crate::Net::Incoming::{MessageHandlers, PipeIn};
use crate::Net::Message::TypeDirectory;
use crate::Net::Outgoing::{OutgoingRingBuffer, PipeOut};

/// Assembles the outgoing and incoming pipe of one connection.
pub struct ConnectionBuilder {
    config: NetConfig,
    connection_id: u16,
    directory: Arc<dyn MessageDirectory>,
    correlator: Arc<dyn ResponseCorrelator>,
    pool: Arc<dyn BufferPool>,
    flow: Arc<dyn FlowControl>,
    metrics: Arc<NetMetrics>,
    handlers: Option<Arc<MessageHandlers>>,
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self {
            config: NetConfig::default(),
            connection_id: 0,
            directory: Arc::new(TypeDirectory::new()),
            correlator: Arc::new(NoCorrelator),
            pool: Arc::new(DropBufferPool),
            flow: Arc::new(NoFlowControl),
            metrics: Arc::new(NetMetrics::new()),
            handlers: None,
        }
    }
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: NetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_connection_id(mut self, connection_id: u16) -> Self {
        self.connection_id = connection_id;
        self
    }

    pub fn with_directory(mut self, directory: Arc<dyn MessageDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_correlator(mut self, correlator: Arc<dyn ResponseCorrelator>) -> Self {
        self.correlator = correlator;
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<dyn BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_flow_control(mut self, flow: Arc<dyn FlowControl>) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<NetMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share an existing handler pool instead of starting one per connection.
    pub fn with_handlers(mut self, handlers: Arc<MessageHandlers>) -> Self {
        self.handlers = Some(handlers);
        self
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn build_pipe_out(&self) -> Result<PipeOut, NetError> {
        let ring = OutgoingRingBuffer::with_flow_control(
            &self.config,
            Arc::clone(&self.metrics),
            Arc::clone(&self.flow),
        )?;
        Ok(PipeOut::new(self.connection_id, Arc::new(ring)))
    }

    pub fn build_pipe_in(&self) -> Result<PipeIn, NetError> {
        self.config.validate()?;
        let handlers = match &self.handlers {
            Some(handlers) => Arc::clone(handlers),
            None => MessageHandlers::new(
                self.config.handler_threads,
                self.config.handler_queue_depth,
            )?,
        };
        Ok(PipeIn::new(
            self.connection_id,
            self.config.receive_slots,
            Arc::clone(&self.directory),
            Arc::clone(&self.correlator),
            handlers,
            Arc::clone(&self.pool),
            Arc::clone(&self.flow),
            Arc::clone(&self.metrics),
        ))
    }

    /// Both pipes of the connection.
    pub fn build(self) -> Result<(PipeOut, PipeIn), NetError> {
        let pipe_out = self.build_pipe_out()?;
        let pipe_in = self.build_pipe_in()?;
        debug!(connection = self.connection_id, "connection pipes built");
        Ok((pipe_out, pipe_in))
    }
}
