//! Object header message type identifiers.

macro_rules! message_types {
    ($($variant:ident = $id:literal,)*) => {
        /// Header message types this crate distinguishes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum MessageType {
            $($variant,)*
            /// Any other message, kept with its raw type ID.
            Unknown(u16),
        }

        impl MessageType {
            /// Map a raw type ID.
            pub fn from_u16(val: u16) -> MessageType {
                match val {
                    $($id => MessageType::$variant,)*
                    other => MessageType::Unknown(other),
                }
            }

            /// Raw type ID.
            pub fn to_u16(self) -> u16 {
                match self {
                    $(MessageType::$variant => $id,)*
                    MessageType::Unknown(v) => v,
                }
            }
        }
    };
}

message_types! {
    Nil = 0x0000,
    Dataspace = 0x0001,
    LinkInfo = 0x0002,
    Datatype = 0x0003,
    FillValueOld = 0x0004,
    FillValue = 0x0005,
    Link = 0x0006,
    DataLayout = 0x0008,
    GroupInfo = 0x000A,
    FilterPipeline = 0x000B,
    Attribute = 0x000C,
    Continuation = 0x0010,
    SymbolTable = 0x0011,
    ModificationTime = 0x0012,
}
