//! Named input and output slots of the DAE, RDAE and integrator contracts.

macro_rules! scheme {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const COUNT: usize = $name::ALL.len();

            /// Position of the slot in an argument or result list.
            pub fn index(self) -> usize {
                self as usize
            }

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }
    };
}

scheme!(
    /// Inputs of the forward DAE callback.
    DaeIn { T => "t", X => "x", Z => "z", P => "p" }
);

scheme!(
    /// Outputs of the forward DAE callback.
    DaeOut { Ode => "ode", Alg => "alg", Quad => "quad" }
);

scheme!(
    /// Inputs of the backward (RDAE) callback.
    RdaeIn { T => "t", X => "x", Z => "z", P => "p", Rx => "rx", Rz => "rz", Rp => "rp" }
);

scheme!(
    /// Outputs of the backward (RDAE) callback.
    RdaeOut { Ode => "ode", Alg => "alg", Quad => "quad" }
);

scheme!(
    /// Initial values fed to an integrator.
    IntegratorInput { X0 => "x0", P => "p", Z0 => "z0", Rx0 => "rx0", Rp => "rp", Rz0 => "rz0" }
);

scheme!(
    /// Terminal values produced by an integrator.
    IntegratorOutput { Xf => "xf", Qf => "qf", Zf => "zf", Rxf => "rxf", Rqf => "rqf", Rzf => "rzf" }
);
