use aesctr_engine::{BackendKind, BlockCipher, ChunkGeometry, Counter, Engine, EngineConfig, Key};

// SP 800-38A, AES-256.
const KEY: &str = "603deb1015ca71be2b73aef0857d77811f352c073b6108d72d9810a30914dff4";

const ECB: [(&str, &str); 4] = [
    ("6bc1bee22e409f96e93d7e117393172a", "f3eed1bdb5d2a03c064b5a7e3db181f8"),
    ("ae2d8a571e03ac9c9eb76fac45af8e51", "591ccb10d410ed26dc5ba74a31362870"),
    ("30c81c46a35ce411e5fbc1191a0a52ef", "b6ed21b99ca6f4f9f153e7b1beafed1d"),
    ("f69f2445df4f9b17ad2b417be66c3710", "23304b7a39f9f3ff067d8d8f9e24ecc7"),
];

const CTR_IV: &str = "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff";
const CTR_PLAIN: &str = "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51\
                         30c81c46a35ce411e5fbc1191a0a52eff69f2445df4f9b17ad2b417be66c3710";
const CTR_CIPHER: &str = "601ec313775789a5b7a7f504bbf3d228f443e3ca4d62b59aca84e990cacaf5c5\
                          2b0930daa23de94ce87017ba2d84988ddfc9c58db67aada613c2dd08457941a6";

fn engines() -> Vec<Engine> {
    BackendKind::ALL
        .into_iter()
        .filter_map(|kind| Engine::new(EngineConfig::with_backend(kind)).ok())
        .collect()
}

fn key() -> Key {
    Key::from_slice(&hex::decode(KEY).unwrap()).unwrap()
}

#[test]
fn ecb_blocks_match_on_every_backend() {
    for engine in engines() {
        let ek = engine.expand_key(&key());
        for (plain, cipher) in ECB {
            let mut block = [0u8; 16];
            hex::decode_to_slice(plain, &mut block).unwrap();
            // A counter held at a fixed value is just an ECB block.
            let counter = Counter::from_bytes(block);
            let mut out = counter.to_block();
            engine.cipher().encrypt_block(&ek, &mut out).unwrap();
            assert_eq!(hex::encode(out), cipher, "{}", engine.backend());
        }
    }
}

#[test]
fn ctr_vector_on_every_backend() {
    let mut iv = [0u8; 16];
    hex::decode_to_slice(CTR_IV, &mut iv).unwrap();
    let plain = hex::decode(CTR_PLAIN).unwrap();

    for engine in engines() {
        let ek = engine.expand_key(&key());
        let mut counter = Counter::from_bytes(iv);
        let mut out = vec![0u8; plain.len()];
        engine
            .encrypt(&ek, &mut counter, &ChunkGeometry::unchunked(), &plain, &mut out, plain.len())
            .unwrap();
        assert_eq!(hex::encode(&out), CTR_CIPHER, "{}", engine.backend());
        assert_eq!(counter.block_index(), 0xf8f9_fafb_fcfd_feff + 4);
    }
}

#[test]
fn expanded_keys_agree_across_backends() {
    let mut schedules = engines().into_iter().map(|e| e.expand_key(&key()));
    let first = schedules.next().unwrap();
    assert_eq!(
        hex::encode(first.round_key(14)),
        "fe4890d1e6188d0b046df344706c631e"
    );
    for other in schedules {
        assert_eq!(&first.to_bytes()[..], &other.to_bytes()[..]);
    }
}
