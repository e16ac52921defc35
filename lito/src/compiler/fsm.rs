/// Small deterministic state machine. A transition only happens when it was
/// declared up front; undeclared moves leave the current state untouched.
#[derive(Clone, Debug)]
pub struct Fsm<S: Copy + Eq> {
    current: S,
    transitions: Vec<(S, S)>,
}

impl<S: Copy + Eq> Fsm<S> {
    /// `states` lists each target state with the states it may be entered from.
    pub fn new(initial: S, states: &[(S, &[S])]) -> Self {
        let mut transitions = Vec::new();
        for (to, from) in states {
            for source in from.iter() {
                transitions.push((*source, *to));
            }
        }
        Self {
            current: initial,
            transitions,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn is(&self, state: S) -> bool {
        self.current == state
    }

    pub fn can(&self, to: S) -> bool {
        self.transitions
            .iter()
            .any(|(from, target)| *from == self.current && *target == to)
    }

    /// Moves to `to` when the transition is declared. Returns whether it moved.
    pub fn set(&mut self, to: S) -> bool {
        if self.can(to) {
            self.current = to;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Fsm;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Yellow,
    }

    fn machine() -> Fsm<Light> {
        Fsm::new(
            Light::Red,
            &[
                (Light::Green, &[Light::Red]),
                (Light::Yellow, &[Light::Green]),
                (Light::Red, &[Light::Yellow]),
            ],
        )
    }

    #[test]
    fn declared_transitions_move() {
        let mut fsm = machine();
        assert!(fsm.set(Light::Green));
        assert!(fsm.set(Light::Yellow));
        assert!(fsm.is(Light::Yellow));
    }

    #[test]
    fn undeclared_transition_is_ignored() {
        let mut fsm = machine();
        assert!(!fsm.set(Light::Yellow));
        assert_eq!(fsm.current(), Light::Red);
    }
}
