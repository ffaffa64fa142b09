use crc::{Crc, CRC_32_CKSUM};

pub fn compute_crc32(data: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_CKSUM);
    let mut digest = crc.digest();
    digest.update(data);
    return digest.finalize();
}
