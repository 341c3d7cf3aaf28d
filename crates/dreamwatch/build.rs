use vergen_gitcl::{BuildBuilder, CargoBuilder, Emitter, GitclBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_date(true).build()?;
    let cargo = CargoBuilder::default().target_triple(true).build()?;
    let gitcl = GitclBuilder::default().sha(true).build()?;

    let emitted = Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit();

    // コンテナビルドなど git が使えない環境では環境変数から補う
    if emitted.is_err() {
        emit_fallback("VERGEN_BUILD_DATE", std::env::var("SOURCE_DATE").ok());
        emit_fallback("VERGEN_CARGO_TARGET_TRIPLE", std::env::var("TARGET").ok());
        emit_fallback(
            "VERGEN_GIT_SHA",
            std::env::var("GITHUB_SHA")
                .ok()
                .map(|sha| sha[..7.min(sha.len())].to_string()),
        );
    }

    Ok(())
}

fn emit_fallback(key: &str, value: Option<String>) {
    let value = value.unwrap_or_else(|| "unknown".to_string());
    println!("cargo::rustc-env={key}={value}");
}
