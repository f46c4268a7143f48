mod checksum;

pub use checksum::{
    digest_file_hex, digest_hex, digest_reader_hex, sha256_hex, verify_digest_file,
    HashAlgorithm,
};
