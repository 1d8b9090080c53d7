//! Events emitted by the SDK for the application layer to consume.

/// A channel on the server, as reported by the native module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u64,
    pub name: String,
}

/// Another client visible on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: u64,
    pub nickname: String,
}

/// Events the SDK emits to the consumer (CLI, GUI, bot, etc.)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Connection attempt started.
    Connecting,

    /// Successfully connected to the server.
    Connected,

    /// A channel became visible (on join, or created while connected).
    ChannelAdded { channel: Channel },

    /// A channel was removed.
    ChannelRemoved { channel_id: u64 },

    /// A client joined a channel we can see.
    ClientJoined { client: Client, channel_id: u64 },

    /// A client left a channel.
    ClientLeft { client_id: u64, channel_id: u64 },

    /// A client moved to another channel.
    ClientMoved { client_id: u64, channel_id: u64 },

    /// A client started or stopped talking.
    TalkStatusChanged { client_id: u64, talking: bool },

    /// A text message from a channel or a private message.
    TextMessage {
        from_id: u64,
        from_nickname: String,
        text: String,
    },

    /// Connection was closed. Terminal for this connection.
    Disconnected { reason: String },
}
