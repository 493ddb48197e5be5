use sha3::{Digest, Sha3_256};

pub fn get_sha3_256_hash(data: &str) -> String {
   let mut hasher = Sha3_256::default();
   hasher.update(data);
   format!("{:X}", hasher.finalize())
}
