//! Tank pool
//!
//! Fixed-size pool created up front at server start. Tanks are never
//! allocated after construction; joins lease an existing free tank and
//! leaves return it. Lookups only resolve leased tanks, so a stale id
//! held by a disconnected client can never touch a recycled tank.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::game::tank::{Tank, TankId};

pub struct TankPool {
    /// All tanks, in creation order. `tank_0` sits at index 0.
    tanks: Vec<Tank>,
    /// Leased tank id -> index into `tanks`
    leased: HashMap<TankId, usize>,
}

impl TankPool {
    pub fn new(size: usize) -> Self {
        let tanks = (0..size).map(Tank::new).collect();
        debug!("Created tank pool with {} tanks", size);
        Self {
            tanks,
            leased: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tanks.len()
    }

    pub fn leased_count(&self) -> usize {
        self.leased.len()
    }

    pub fn free_count(&self) -> usize {
        self.tanks.len() - self.leased.len()
    }

    /// Lease the lowest-numbered free tank, or None when every tank is out.
    pub fn acquire(&mut self) -> Option<&Tank> {
        let index = self.tanks.iter().position(|tank| !tank.active)?;
        let tank = &mut self.tanks[index];
        tank.active = true;
        self.leased.insert(tank.id.clone(), index);
        let tank = &self.tanks[index];
        debug!("Leased {} ({} free)", tank.id, self.free_count());
        Some(tank)
    }

    /// Reset a leased tank and return it to the free set. Releasing a tank
    /// that is unknown or already free is a reported no-op.
    pub fn release(&mut self, tank_id: &str) -> bool {
        match self.leased.remove(tank_id) {
            Some(index) => {
                self.tanks[index].reset();
                debug!("Released {} ({} free)", tank_id, self.free_count());
                true
            }
            None => {
                warn!("Release of unknown or already free tank '{}'", tank_id);
                false
            }
        }
    }

    /// Resolve a leased tank by id. Free tanks are not reachable here.
    pub fn lookup(&self, tank_id: &str) -> Option<&Tank> {
        self.leased.get(tank_id).map(|&index| &self.tanks[index])
    }

    pub fn lookup_mut(&mut self, tank_id: &str) -> Option<&mut Tank> {
        match self.leased.get(tank_id) {
            Some(&index) => Some(&mut self.tanks[index]),
            None => None,
        }
    }
}
