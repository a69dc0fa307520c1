//! Demo: one object graph written in every serialization mode and preset
//!
//! Prints the frame size, header flags and transforms for each, and checks that every
//! frame reads back to the original value.
//!
//! Run with: `cargo run --example serialization_modes`

#![allow(clippy::uninlined_format_args)]

use afrs::config::{DeserializeOptions, SerializeOptions};
use afrs::core::SerializationMode;
use afrs::transform::{EncryptionAlgorithm, EncryptionKey};
use afrs::{binary_object, BinarySerializer};

#[derive(Debug, Clone, PartialEq, Default)]
struct Item {
    id: u32,
    label: String,
}

binary_object! {
    Item => "demo.Item", schema = 1 {
        id: u32 = 0,
        label: String = 1,
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Inventory {
    owner: String,
    gold: u64,
    items: Vec<Item>,
}

binary_object! {
    Inventory => "demo.Inventory", schema = 1 {
        owner: String = 0,
        gold: u64 = 1,
        items: Vec<Item> = 2,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let serializer = BinarySerializer::new();
    let inventory = Inventory {
        owner: "ada".into(),
        gold: 1_250,
        items: (0..40)
            .map(|id| Item {
                id,
                label: format!("potion #{}", id % 5),
            })
            .collect(),
    };

    println!("=== Modes ===");
    for mode in SerializationMode::ALL {
        let opts = SerializeOptions::builder().mode(mode).build()?;
        let frame = serializer
            .serialize(&inventory, &opts)
            .into_result()
            .map_err(|f| f.to_string())?
            .0;
        let info = serializer.inspect(&frame)?;
        println!(
            "{:<18} {:>6} bytes  flags {:?}",
            mode.name(),
            frame.len(),
            info.header.flags()
        );

        let back = serializer
            .deserialize::<Inventory>(&frame, &DeserializeOptions::default())
            .into_value();
        assert_eq!(back.as_ref(), Some(&inventory));
    }

    println!("\n=== Presets ===");
    let key = EncryptionKey::generate(EncryptionAlgorithm::ChaCha20Poly1305)?;
    let presets = [
        ("network", SerializeOptions::for_network()),
        ("storage", SerializeOptions::for_storage()),
        ("save game", SerializeOptions::for_save_game()),
        ("debug", SerializeOptions::for_debug()),
        (
            "network+aead",
            SerializeOptions::for_network()
                .to_builder()
                .encryption(EncryptionAlgorithm::ChaCha20Poly1305, key.clone())
                .build()?,
        ),
    ];
    let reader = DeserializeOptions::builder().key(key).build()?;
    for (name, opts) in &presets {
        let outcome = serializer.serialize(&inventory, opts);
        let stats = outcome.stats().copied().unwrap_or_default();
        let frame = outcome.into_value().unwrap_or_default();
        let info = serializer.verify(&frame, &reader)?;
        println!(
            "{:<14} {:>6} bytes  ratio {:.2}  compressed {}  encrypted {}  checksum {}",
            name,
            frame.len(),
            stats.compression_ratio(),
            info.is_compressed(),
            info.is_encrypted(),
            info.checksum.name()
        );

        let back = serializer.deserialize::<Inventory>(&frame, &reader).into_value();
        assert_eq!(back.as_ref(), Some(&inventory));
    }

    Ok(())
}
