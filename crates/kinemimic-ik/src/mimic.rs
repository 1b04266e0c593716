//! Mimic joints and the full/reduced joint-vector mapping.
//!
//! A chain with mimic joints has fewer independent DOFs than joints. The
//! *full* vector has one entry per chain joint; the *reduced* vector has one
//! entry per active joint, in chain order. [`MimicMap`] holds one
//! [`JointMimic`] per chain joint and converts between the two spaces:
//!
//! ```text
//! reduce: full ──► reduced   (keep active entries)
//! expand: reduced ──► full   (active: copy, mimic: m * r[i] + o)
//! ```
//!
//! `reduce(expand(r)) == r` for every reduced vector `r`.

use std::collections::HashMap;

use kinemimic_urdf::RobotModel;

use crate::chain::KinematicChain;
use crate::error::{KinematicsError, LimitsError, MimicError};
use crate::limits::JointLimits;

/// How one chain joint relates to the reduced vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JointMimic {
    /// The joint owns reduced slot `reduced_index`.
    Active { reduced_index: usize },
    /// The joint follows the active joint in `reduced_index`:
    /// `q = multiplier * r[reduced_index] + offset`.
    Mimic {
        reduced_index: usize,
        multiplier: f64,
        offset: f64,
    },
}

impl JointMimic {
    pub const fn active(reduced_index: usize) -> Self {
        Self::Active { reduced_index }
    }

    pub const fn mimic(reduced_index: usize, multiplier: f64, offset: f64) -> Self {
        Self::Mimic {
            reduced_index,
            multiplier,
            offset,
        }
    }

    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    /// The reduced slot this joint owns or follows.
    pub const fn reduced_index(&self) -> usize {
        match *self {
            Self::Active { reduced_index } | Self::Mimic { reduced_index, .. } => reduced_index,
        }
    }

    /// `(multiplier, offset)`; identity for active joints.
    pub const fn coefficients(&self) -> (f64, f64) {
        match *self {
            Self::Active { .. } => (1.0, 0.0),
            Self::Mimic {
                multiplier, offset, ..
            } => (multiplier, offset),
        }
    }

    /// Value of this joint given the value of its reduced slot.
    pub fn apply(&self, driver: f64) -> f64 {
        match *self {
            Self::Active { .. } => driver,
            Self::Mimic {
                multiplier, offset, ..
            } => multiplier.mul_add(driver, offset),
        }
    }
}

/// Validated mimic descriptors for every joint of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct MimicMap {
    joints: Vec<JointMimic>,
    reduced_dof: usize,
}

impl MimicMap {
    /// Every joint active: reduced and full spaces coincide.
    pub fn identity(dof: usize) -> Self {
        Self {
            joints: (0..dof).map(JointMimic::active).collect(),
            reduced_dof: dof,
        }
    }

    /// Validate a descriptor set.
    ///
    /// Active joints must claim reduced slots `0, 1, 2, ...` in chain order,
    /// mimic joints must reference one of those slots, and all coefficients
    /// must be finite.
    pub fn new(joints: Vec<JointMimic>) -> Result<Self, MimicError> {
        let mut reduced_dof = 0;
        for (joint, mimic) in joints.iter().enumerate() {
            if let JointMimic::Active { reduced_index } = *mimic {
                if reduced_index != reduced_dof {
                    return Err(MimicError::SlotOrder {
                        joint,
                        expected: reduced_dof,
                        got: reduced_index,
                    });
                }
                reduced_dof += 1;
            }
        }

        for (joint, mimic) in joints.iter().enumerate() {
            let (multiplier, offset) = mimic.coefficients();
            if !multiplier.is_finite() || !offset.is_finite() {
                return Err(MimicError::NonFinite { joint });
            }
            let slot = mimic.reduced_index();
            if slot >= reduced_dof {
                return Err(MimicError::InvalidReference {
                    joint,
                    slot,
                    reduced_dof,
                });
            }
        }

        Ok(Self {
            joints,
            reduced_dof,
        })
    }

    /// Validate a descriptor set against a chain of `dof` joints.
    pub fn for_chain(chain: &KinematicChain, joints: Vec<JointMimic>) -> Result<Self, MimicError> {
        if joints.len() != chain.dof() {
            return Err(MimicError::CountMismatch {
                expected: chain.dof(),
                got: joints.len(),
            });
        }
        Self::new(joints)
    }

    /// Derive the descriptor set for `chain` from the `<mimic>` tags in `model`.
    ///
    /// A joint whose mimic target lies outside the chain stays active, since
    /// nothing in the chain drives it. A joint that mimics another mimic joint
    /// of the chain is rejected.
    pub fn from_model(model: &RobotModel, chain: &KinematicChain) -> Result<Self, MimicError> {
        let names = chain.joint_names();
        let position: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, &n)| (n, i)).collect();

        // Chain index of the driver, for each joint that mimics inside the chain.
        let mut drivers: Vec<Option<usize>> = Vec::with_capacity(names.len());
        for &name in &names {
            let joint = model
                .joint(name)
                .map_err(|_| MimicError::UnknownJoint(name.to_string()))?;
            let driver = match &joint.mimic {
                Some(mimic) => {
                    if model.joint(&mimic.joint).is_err() {
                        return Err(MimicError::UnknownJoint(mimic.joint.clone()));
                    }
                    position.get(mimic.joint.as_str()).copied()
                }
                None => None,
            };
            drivers.push(driver);
        }

        let mut slots = vec![0; names.len()];
        let mut reduced_dof = 0;
        for (i, driver) in drivers.iter().enumerate() {
            if driver.is_none() {
                slots[i] = reduced_dof;
                reduced_dof += 1;
            }
        }

        let mut joints = Vec::with_capacity(names.len());
        for (i, driver) in drivers.iter().enumerate() {
            let descriptor = match *driver {
                None => JointMimic::active(slots[i]),
                Some(d) if drivers[d].is_some() => {
                    return Err(MimicError::MimicOfMimic {
                        joint: names[i].to_string(),
                        target: names[d].to_string(),
                    });
                }
                Some(d) => {
                    let data = model
                        .joint(names[i])
                        .ok()
                        .and_then(|j| j.mimic.as_ref())
                        .ok_or_else(|| MimicError::UnknownJoint(names[i].to_string()))?;
                    JointMimic::mimic(slots[d], data.multiplier, data.offset)
                }
            };
            joints.push(descriptor);
        }

        Self::new(joints)
    }

    /// Number of chain joints (full-vector length).
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Number of active joints (reduced-vector length).
    pub fn reduced_dof(&self) -> usize {
        self.reduced_dof
    }

    pub fn joints(&self) -> &[JointMimic] {
        &self.joints
    }

    /// Full → reduced.
    pub fn reduce(&self, full: &[f64]) -> Result<Vec<f64>, KinematicsError> {
        let mut reduced = Vec::with_capacity(self.reduced_dof);
        self.reduce_into(full, &mut reduced)?;
        Ok(reduced)
    }

    /// Reduced → full.
    pub fn expand(&self, reduced: &[f64]) -> Result<Vec<f64>, KinematicsError> {
        let mut full = Vec::with_capacity(self.joints.len());
        self.expand_into(reduced, &mut full)?;
        Ok(full)
    }

    /// [`reduce`](Self::reduce) into a reusable buffer.
    pub fn reduce_into(&self, full: &[f64], out: &mut Vec<f64>) -> Result<(), KinematicsError> {
        if full.len() != self.joints.len() {
            return Err(KinematicsError::DimensionMismatch {
                expected: self.joints.len(),
                got: full.len(),
            });
        }
        out.clear();
        out.extend(
            self.joints
                .iter()
                .zip(full)
                .filter(|(mimic, _)| mimic.is_active())
                .map(|(_, &value)| value),
        );
        Ok(())
    }

    /// [`expand`](Self::expand) into a reusable buffer.
    pub fn expand_into(&self, reduced: &[f64], out: &mut Vec<f64>) -> Result<(), KinematicsError> {
        if reduced.len() != self.reduced_dof {
            return Err(KinematicsError::DimensionMismatch {
                expected: self.reduced_dof,
                got: reduced.len(),
            });
        }
        out.clear();
        out.extend(
            self.joints
                .iter()
                .map(|mimic| mimic.apply(reduced[mimic.reduced_index()])),
        );
        Ok(())
    }

    /// Limits over the reduced space implied by full-space `limits`.
    ///
    /// Each active slot's interval is its own interval intersected with the
    /// interval every mimic of it allows, `(bound - offset) / multiplier`.
    /// A mimic with a zero multiplier is constant and only has to sit inside
    /// its own limits.
    pub fn reduced_limits(&self, limits: &JointLimits) -> Result<JointLimits, MimicError> {
        if limits.len() != self.joints.len() {
            return Err(MimicError::CountMismatch {
                expected: self.joints.len(),
                got: limits.len(),
            });
        }

        let (lower, upper): (Vec<f64>, Vec<f64>) = self
            .joints
            .iter()
            .enumerate()
            .filter(|(_, mimic)| mimic.is_active())
            .map(|(i, _)| (limits.lower()[i], limits.upper()[i]))
            .unzip();
        let mut reduced = JointLimits::new(lower, upper).map_err(|err| match err {
            LimitsError::Inverted { joint, .. } => MimicError::EmptyLimits { slot: joint },
            LimitsError::LengthMismatch { .. } => MimicError::CountMismatch {
                expected: self.reduced_dof,
                got: limits.len(),
            },
        })?;

        for (i, mimic) in self.joints.iter().enumerate() {
            let JointMimic::Mimic {
                reduced_index,
                multiplier,
                offset,
            } = *mimic
            else {
                continue;
            };
            let (lo, hi) = (limits.lower()[i], limits.upper()[i]);

            if multiplier == 0.0 {
                if !(lo <= offset && offset <= hi) {
                    return Err(MimicError::EmptyLimits {
                        slot: reduced_index,
                    });
                }
                continue;
            }

            let a = (lo - offset) / multiplier;
            let b = (hi - offset) / multiplier;
            let (driver_lo, driver_hi) = if multiplier > 0.0 { (a, b) } else { (b, a) };

            let (slot_lo, slot_hi) = reduced.bounds_mut(reduced_index);
            *slot_lo = slot_lo.max(driver_lo);
            *slot_hi = slot_hi.min(driver_hi);
            if *slot_lo > *slot_hi {
                return Err(MimicError::EmptyLimits {
                    slot: reduced_index,
                });
            }
        }

        for slot in 0..self.reduced_dof {
            self.tighten_slot(slot, limits, &mut reduced)?;
        }

        Ok(reduced)
    }

    /// Pull the bounds of `slot` inward until every mimic of it, evaluated
    /// at either bound, lands inside its own limits.
    ///
    /// `(bound - offset) / multiplier` is rounded, so `apply` at the derived
    /// bound can overshoot the mimic's limit by an ulp or two.
    fn tighten_slot(
        &self,
        slot: usize,
        limits: &JointLimits,
        reduced: &mut JointLimits,
    ) -> Result<(), MimicError> {
        let allows = |driver: f64| {
            self.joints.iter().enumerate().all(|(i, mimic)| match *mimic {
                JointMimic::Mimic {
                    reduced_index,
                    multiplier,
                    ..
                } if reduced_index == slot && multiplier != 0.0 => {
                    let q = mimic.apply(driver);
                    limits.lower()[i] <= q && q <= limits.upper()[i]
                }
                _ => true,
            })
        };

        let (slot_lo, slot_hi) = reduced.bounds_mut(slot);
        for _ in 0..MAX_TIGHTEN_STEPS {
            if allows(*slot_hi) || *slot_hi <= *slot_lo {
                break;
            }
            *slot_hi = step_toward(*slot_hi, *slot_lo);
        }
        for _ in 0..MAX_TIGHTEN_STEPS {
            if allows(*slot_lo) || *slot_lo >= *slot_hi {
                break;
            }
            *slot_lo = step_toward(*slot_lo, *slot_hi);
        }

        if *slot_lo > *slot_hi || !allows(*slot_lo) || !allows(*slot_hi) {
            return Err(MimicError::EmptyLimits { slot });
        }
        Ok(())
    }
}

/// Rounding error of a single divide-and-subtract is a few ulps at most.
const MAX_TIGHTEN_STEPS: usize = 64;

/// The next representable `f64` after `x` in the direction of `toward`.
fn step_toward(x: f64, toward: f64) -> f64 {
    if x == toward || x.is_nan() || toward.is_nan() {
        return x;
    }
    if x == 0.0 {
        let tiny = f64::from_bits(1);
        return if toward > 0.0 { tiny } else { -tiny };
    }
    let bits = x.to_bits();
    // Moving away from zero grows the magnitude bits; moving toward it shrinks them.
    if (toward > x) == (x > 0.0) {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
