// Converts a Message to and from the full region image, see constants.rs for
// the layout.
use crate::constants::{
    MAX_PAYLOAD, MAX_WIRE_SIZE, POS_EXCHANGE_ACK, POS_EXCHANGE_SEQ, POS_MRQ, POS_RET_CODE,
    POS_RX_BUF, POS_RX_SIZE, POS_TX_BUF, POS_TX_SIZE, REGION_SIZE,
};
use crate::error::Error;
use crate::message::{Message, Payload};

/// Builds the image the guest writes into the window. Everything outside the
/// tx buffer, tx size and mrq slot is zero.
pub fn encode(message: &Message) -> Result<[u8; REGION_SIZE], Error> {
    let size = message.tx.size();
    if size >= MAX_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            size: size,
            max: MAX_PAYLOAD - 1,
        });
    }
    // the size field is a single byte on the wire, never truncate it
    if size > MAX_WIRE_SIZE {
        return Err(Error::PayloadTooLarge {
            size: size,
            max: MAX_WIRE_SIZE,
        });
    }
    if message.request_id > u8::MAX as u32 {
        return Err(Error::InvalidArgument(format!(
            "request id {:#x} does not fit the one byte mrq slot",
            message.request_id
        )));
    }

    let mut image = [0u8; REGION_SIZE];
    image[POS_TX_BUF..POS_TX_BUF + size].copy_from_slice(&message.tx.data);
    image[POS_TX_SIZE] = size as u8;
    image[POS_MRQ] = message.request_id as u8;
    return Ok(image);
}

fn read_size(image: &[u8], pos: usize, what: &str) -> Result<usize, Error> {
    let size = image[pos] as usize;
    if size >= MAX_PAYLOAD {
        return Err(Error::ProtocolViolation(format!(
            "{} of {} exceeds the {} byte payload bound",
            what, size, MAX_PAYLOAD
        )));
    }
    return Ok(size);
}

/// Reads a region image back into a Message. The size fields written by the
/// remote are authoritative for both directions.
pub fn decode(image: &[u8]) -> Result<Message, Error> {
    if image.len() != REGION_SIZE {
        return Err(Error::ProtocolViolation(format!(
            "expected a {} byte region image, got {}",
            REGION_SIZE,
            image.len()
        )));
    }

    let tx_size = read_size(image, POS_TX_SIZE, "tx size")?;
    let rx_size = read_size(image, POS_RX_SIZE, "rx size")?;

    return Ok(Message {
        request_id: image[POS_MRQ] as u32,
        tx: Payload::from(&image[POS_TX_BUF..POS_TX_BUF + tx_size]),
        rx: Payload::from(&image[POS_RX_BUF..POS_RX_BUF + rx_size]),
        // one byte, two's complement
        return_code: image[POS_RET_CODE] as i8 as i32,
    });
}

pub fn read_sequence(image: &[u8]) -> u32 {
    return read_u32_le(image, POS_EXCHANGE_SEQ);
}

pub fn read_ack(image: &[u8]) -> u32 {
    return read_u32_le(image, POS_EXCHANGE_ACK);
}

fn read_u32_le(image: &[u8], pos: usize) -> u32 {
    let mut data = [0u8; 4];
    data.copy_from_slice(&image[pos..pos + 4]);
    return u32::from_le_bytes(data);
}
