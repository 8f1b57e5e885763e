use criterion::{criterion_group, criterion_main, Criterion};
use pockethandheld_core::emulator::GameBoy;
use pockethandheld_core::EmulatorOptionsBuilder;

/// A minimal header-only ROM: enough for `load_rom` to accept it and for the CPU to run its
/// all-NOP body, without depending on an external test ROM file.
fn synthesized_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x147] = 0x00; // no MBC
    rom[0x148] = 0x00; // 32 KiB
    rom[0x149] = 0x00; // no RAM
    rom
}

fn frame_benchmark(c: &mut Criterion) {
    let mut gb = GameBoy::init(EmulatorOptionsBuilder::new().build());
    gb.load_rom(synthesized_rom()).unwrap();

    c.bench_function("step_frame", |b| b.iter(|| gb.step_frame()));
}

criterion_group!(benches, frame_benchmark);
criterion_main!(benches);
