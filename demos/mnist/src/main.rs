use anyhow::Result;

mod driver;
#[cfg(test)]
mod driver_tests;

fn main() -> Result<()> {
    // Initialize the logger
    pretty_env_logger::init();
    println!("Starting MNIST multinomial logistic regression with Vidar...");

    let accuracy = driver::run()?;
    println!("{accuracy}");

    Ok(())
}
