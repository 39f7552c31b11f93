use anyhow::Result;

fn main() -> Result<()> {
    ldes_fragmenter_cli::run()
}
