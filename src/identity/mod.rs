// Identity module - Ed25519 keys, signatures and out-of-band key bundles

mod bundle;
mod keypair;
mod signer;

pub use bundle::{BundleError, KeyBundle, KeyMaterialSource, PendingBundle};
pub use keypair::{KeyError, Keypair, PublicKey, SharedKey, SHARED_KEY_LEN};
pub use signer::{Signature, SignatureError, Signer, SIGNATURE_LEN};
