// Fixed layout of the guest <-> host shared window. Both ends have to agree on
// this byte for byte, so treat it as frozen.

// Every field is byte addressed (no word scaling).
// layout
//  0x000 -- uint8[512] tx buffer, outbound payload
//  0x200 -- uint8[512] rx buffer, inbound payload
//  0x400 -- uint8 tx size
//  0x401 -- uint8 rx size
//  0x402 -- int8 return code, written by the remote
//  0x500 -- uint8 mrq, writing this is what kicks the remote
//  0x600 -- uint32 (le) exchange sequence, only used with bounded wait
//  0x604 -- uint32 (le) exchange ack, remote echoes the sequence here
// 0x1000 -- end
// Anything not listed above is written as zero by the guest.

pub const REGION_SIZE: usize = 0x1000;
pub const MAX_PAYLOAD: usize = 0x200;

// Absolute positions in the region
pub const POS_TX_BUF: usize = 0x000;
pub const POS_RX_BUF: usize = 0x200;
pub const POS_TX_SIZE: usize = 0x400;
pub const POS_RX_SIZE: usize = 0x401;
pub const POS_RET_CODE: usize = 0x402;
pub const POS_MRQ: usize = 0x500;
pub const POS_EXCHANGE_SEQ: usize = 0x600;
pub const POS_EXCHANGE_ACK: usize = 0x604;

// Largest length the one byte size fields can carry
pub const MAX_WIRE_SIZE: usize = u8::MAX as usize;

// Where the window lives on the reference board
pub const DEFAULT_BASE_ADDRESS: u64 = 0x090c_0000;
pub const DEFAULT_MEM_PATH: &str = "/dev/mem";

// BPMP ABI bits used by the test request
pub const MRQ_RESET: u32 = 20;
pub const CMD_RESET_ASSERT: u32 = 1;
pub const RESET_ID_UARTA: u32 = 0x65;
