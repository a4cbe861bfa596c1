/// Build script for EMTE
///
/// # Shader Strategy:
/// - All backends go through wgpu, WGSL sources are embedded with `include_str!`
///   and validated by naga when the pipelines are created.
fn main() {
    // Trigger rebuild if shader files change
    println!("cargo:rerun-if-changed=src/gfx/wgpu/shaders/sprite.wgsl");
    println!("cargo:rerun-if-changed=src/gfx/wgpu/shaders/lit.wgsl");
    println!("cargo:rerun-if-changed=src/gfx/wgpu/shaders/line.wgsl");
    println!("cargo:rerun-if-changed=src/gfx/wgpu/shaders/composite.wgsl");
}
