/// Reruns flaky external commands a bounded number of times before giving
/// up. Block device tooling occasionally races with udev; a short pause and
/// a second attempt is usually enough.
#[derive(SmartDefault)]
pub struct Retry {
    #[default = 3]
    attempts: u64,
    #[default = 500]
    delay_ms: u64,
}

impl Retry {
    pub fn attempts(mut self, attempts: u64) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn run<F, T, E>(&self, mut func: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
    {
        let delay = std::time::Duration::from_millis(self.delay_ms);
        let mut attempt = 1;
        loop {
            match func() {
                Ok(value) => return Ok(value),
                Err(why) => {
                    if attempt >= self.attempts {
                        return Err(why);
                    }

                    attempt += 1;
                    std::thread::sleep(delay);
                }
            }
        }
    }
}
