//! Dataset metadata gathered from an object header.

use crate::data_layout::DataLayout;
use crate::dataspace::Dataspace;
use crate::datatype::Datatype;
use crate::error::FormatError;
use crate::filter_pipeline::FilterPipeline;
use crate::message_type::MessageType;
use crate::object_header::{HeaderMessage, ObjectHeader};

const SHARED_MESSAGE: u8 = 0x02;

#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub layout: DataLayout,
    pub filters: FilterPipeline,
}

fn required<'a>(header: &'a ObjectHeader, msg_type: MessageType, what: &str) -> Result<&'a HeaderMessage, FormatError> {
    let msg = header
        .find(msg_type)
        .ok_or_else(|| FormatError::Unsupported(format!("dataset without a {what} message")))?;
    if msg.flags & SHARED_MESSAGE != 0 {
        return Err(FormatError::Unsupported(format!("shared {what} message")));
    }
    Ok(msg)
}

impl DatasetInfo {
    /// True when the header carries the messages every dataset has.
    pub fn is_dataset(header: &ObjectHeader) -> bool {
        header.find(MessageType::DataLayout).is_some() && header.find(MessageType::Datatype).is_some()
    }

    pub fn from_header(header: &ObjectHeader, offset_size: u8, length_size: u8) -> Result<DatasetInfo, FormatError> {
        let (datatype, _) = Datatype::parse(&required(header, MessageType::Datatype, "datatype")?.data)?;
        let dataspace = Dataspace::parse(&required(header, MessageType::Dataspace, "dataspace")?.data, length_size)?;
        let layout = DataLayout::parse(
            &required(header, MessageType::DataLayout, "layout")?.data,
            offset_size,
            length_size,
        )?;
        let filters = match header.find(MessageType::FilterPipeline) {
            Some(msg) => FilterPipeline::parse(&msg.data)?,
            None => FilterPipeline::default(),
        };
        Ok(DatasetInfo {
            datatype,
            dataspace,
            layout,
            filters,
        })
    }
}
