// Module naming follows project convention (Net = message transport, Core = native plumbing)
#[allow(non_snake_case)]
pub mod Net {
    pub mod Structs {
        pub mod Message_Structs;
        pub use Message_Structs::{
            MessageFlags, MessageHeader, DEFAULT_MESSAGES_TYPE, HEADER_FIXED_SIZE,
            SUBTYPE_KEEP_ALIVE,
        }; // re-export for stable path
    }
    pub mod Cursor {
        pub mod compact;
        pub mod exporter;
        pub mod importer;
        pub mod underflow;
        pub mod unfinished;
        pub use exporter::{DirectExporter, Exporter, SizeCounter, WrapExporter};
        pub use importer::{DirectImporter, Importer};
        pub use underflow::UnderflowImporter;
        pub use unfinished::{ImportProgress, PipeState, UnfinishedOperation};
    }
    pub mod Message {
        pub mod directory;
        pub mod message;
        pub use directory::TypeDirectory;
        pub use message::{encode_message, header_for, KeepAlive, Message, ReceivedMessage};
    }
    pub mod Outgoing {
        pub mod RingBuffer;
        pub mod RingBuffer_impl;
        pub mod layout;
        pub mod pipe_out;
        pub use layout::{Position, COMMITTING, POSITION_MASK};
        pub use pipe_out::PipeOut;
        pub use RingBuffer::OutgoingRingBuffer;
        pub use RingBuffer_impl::CommittedRange;
    }
    pub mod Incoming {
        pub mod buffer;
        pub mod handlers;
        pub mod pipe_in;
        pub mod slots;
        pub use buffer::IncomingBuffer;
        pub use handlers::{MessageHandlers, MessageReceiver};
        pub use pipe_in::PipeIn;
        pub use slots::{BufferSlots, SlotRef};
    }
    pub mod builder;
    pub mod collaborators;
    pub use builder::ConnectionBuilder;
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod NativeMemory;
    pub mod futex;
    pub mod metrics;
    pub use metrics::{MetricsSnapshot, NetMetrics};
    pub use NativeMemory::NativeBuffer;
}
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub mod config;
pub mod error;

pub use config::NetConfig;
pub use error::{ImportError, NetError, Overflow};
