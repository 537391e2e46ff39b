/// One member of a group as announced by the group leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub id: String,
    pub address: String,
}

impl PeerEntry {
    pub fn new<I: Into<String>, A: Into<String>>(id: I, address: A) -> Self {
        PeerEntry { id: id.into(), address: address.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<PeerEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupManagementMessage {
    PeerList(PeerList),
}

impl GroupManagementMessage {
    pub const PEER_LIST: u16 = 1;

    pub fn variant(&self) -> u16 {
        match self {
            GroupManagementMessage::PeerList(_) => Self::PEER_LIST,
        }
    }

    pub(super) fn encode_body(&self) -> bincode::Result<Vec<u8>> {
        match self {
            GroupManagementMessage::PeerList(m) => bincode::serialize(m),
        }
    }

    pub(super) fn decode_body(variant: u16, body: &[u8]) -> bincode::Result<Option<Self>> {
        match variant {
            Self::PEER_LIST => Ok(Some(GroupManagementMessage::PeerList(bincode::deserialize(body)?))),
            _ => Ok(None),
        }
    }
}
