fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("collect build metadata");
}
