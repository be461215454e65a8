use anyhow::Result;

fn main() -> Result<()> {
    decovar::cli::run()
}
