use crate::asic;
use crate::bus;

pub mod status {
    pub const CLOCK: u8 = 0x01;
    pub const ABOVE_LOWER_LIMIT: u8 = 0x02;
    pub const ABOVE_UPPER_LIMIT: u8 = 0x04;
}

impl<B: bus::Bus> asic::Asic<B> {
    /// Ceiling for every status wait, ten times the exposure level in microseconds.
    ///
    /// Changing the exposure level changes the budget of all subsequent waits.
    pub fn timeout_budget(&self) -> std::time::Duration {
        std::time::Duration::from_micros(self.exposure_level() as u64 * 10)
    }

    fn wait_for<Condition>(
        &mut self,
        operation: &'static str,
        expected: &'static str,
        start: std::time::Instant,
        budget: std::time::Duration,
        condition: Condition,
    ) -> Result<u8, asic::Error>
    where
        Condition: Fn(u8) -> bool,
    {
        loop {
            let status = self.read_channel(asic::channel::STATUS)?;
            if condition(status) {
                return Ok(status);
            }
            if start.elapsed() > budget {
                return Err(asic::Error::Timeout {
                    operation,
                    expected,
                    observed: status,
                    budget,
                });
            }
        }
    }

    pub fn wait_for_clock_level(&mut self, high: bool) -> Result<(), asic::Error> {
        let start = std::time::Instant::now();
        let budget = self.timeout_budget();
        self.wait_for(
            "clock level wait",
            if high { "clock high" } else { "clock low" },
            start,
            budget,
            |status| ((status & status::CLOCK) != 0) == high,
        )?;
        Ok(())
    }

    pub fn wait_for_clock_change(&mut self) -> Result<(), asic::Error> {
        let start = std::time::Instant::now();
        let budget = self.timeout_budget();
        let level = self.read_channel(asic::channel::STATUS)? & status::CLOCK;
        self.wait_for(
            "clock change wait",
            "clock edge",
            start,
            budget,
            |status| (status & status::CLOCK) != level,
        )?;
        Ok(())
    }

    /// Waits for the transfer bit to assert, then to deassert.
    ///
    /// Both phases share the budget measured from the call.
    pub fn wait_for_channel_transfer_to_fifo(
        &mut self,
        channel: asic::Channel,
    ) -> Result<(), asic::Error> {
        let mask = channel.transfer_mask().ok_or(asic::Error::Channel {
            operation: "channel transfer wait",
            channel,
        })?;
        let start = std::time::Instant::now();
        let budget = self.timeout_budget();
        self.wait_for(
            "channel transfer wait",
            "transfer start",
            start,
            budget,
            |status| (status & mask) != 0,
        )?;
        self.wait_for(
            "channel transfer wait",
            "transfer end",
            start,
            budget,
            |status| (status & mask) == 0,
        )?;
        Ok(())
    }

    pub fn is_above_lower_limit(&mut self) -> Result<bool, asic::Error> {
        Ok((self.read_channel(asic::channel::STATUS)? & status::ABOVE_LOWER_LIMIT) != 0)
    }

    pub fn is_above_upper_limit(&mut self) -> Result<bool, asic::Error> {
        Ok((self.read_channel(asic::channel::STATUS)? & status::ABOVE_UPPER_LIMIT) != 0)
    }
}
